//! End-to-end merges of YAML sources on disk.

#![allow(missing_docs)]

use std::{fs, path::Path};

use ssot::{
    compose,
    domain::config::ExtensionSource,
    storage::{self, Artifact},
    validation::DanglingReference,
    Config, Id, MergeError, Provenance,
};
use tempfile::TempDir;
use test_case::test_case;

const BASE_FR: &str = r"
functional_requirements:
  FR-001:
    title: User authentication
    priority: Critical
    category: Security
  FR-002:
    title: User profile
    priority: High
    dependencies:
      - FR-001
";

const BASE_UOW: &str = r"
units_of_work:
  UoW-010:
    name: Auth service
    goal: Users can log in
    layer: Foundation
    implements:
      - FR-001
    estimated_effort_hours: 16
";

const ECOMMERCE: &str = r"
functional_requirements:
  FR-001:
    title: Shopping cart
    priority: High
    category: Commerce
    dependencies:
      - FR-001
      - base:FR-001
units_of_work:
  UoW-301:
    name: Cart service
    goal: Persist carts
    layer: Application
    implements:
      - FR-001
    dependencies:
      - UoW-010
    estimated_effort_hours: 24
";

fn unit_extension(name: &str) -> String {
    format!(
        r"
units_of_work:
  UoW-010:
    name: {name} pipeline
    goal: Ship {name}
    layer: Integration
    implements:
      - base:FR-001
"
    )
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base");
        fs::create_dir(&base).unwrap();
        fs::write(base.join("fr-base.yaml"), BASE_FR).unwrap();
        fs::write(base.join("uow-base.yaml"), BASE_UOW).unwrap();
        fs::create_dir(dir.path().join("extensions")).unwrap();
        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn extension(&self, name: &str, content: &str) -> ExtensionSource {
        let path = self.root().join("extensions").join(format!("{name}.yaml"));
        fs::write(&path, content).unwrap();
        ExtensionSource {
            path,
            provenance: None,
            tag: None,
        }
    }

    fn config(&self, extensions: Vec<ExtensionSource>) -> Config {
        Config {
            project_name: "Scenario".to_string(),
            base: self.root().join("base"),
            extensions,
            output: self.root().join("merged-ssot.yaml"),
            allow_dangling: false,
        }
    }
}

fn id(s: &str) -> Id {
    s.parse().unwrap()
}

fn written(references: &[ssot::Reference]) -> Vec<String> {
    references.iter().map(ToString::to_string).collect()
}

#[test]
fn base_only_reproduces_base() {
    let workspace = Workspace::new();
    let composition = compose(&workspace.config(Vec::new())).unwrap();

    let base = storage::load(&workspace.root().join("base"), Some(Provenance::base())).unwrap();

    assert!(composition.merged.renames().is_empty());
    assert!(composition.report.is_valid());
    assert_eq!(
        serde_yaml::to_string(composition.merged.sections()).unwrap(),
        serde_yaml::to_string(base.document.sections()).unwrap()
    );
}

#[test]
fn ecommerce_extension_keeps_both_login_requirements() {
    let workspace = Workspace::new();
    let ecommerce = workspace.extension("e-commerce", ECOMMERCE);
    let composition = compose(&workspace.config(vec![ecommerce])).unwrap();
    let merged = &composition.merged;

    let cart = &merged.functional[&id("FR-ECOMMERCE-001")];
    assert_eq!(cart.title, "Shopping cart");
    assert_eq!(written(&cart.dependencies), vec!["FR-ECOMMERCE-001", "FR-001"]);
    assert_eq!(merged.functional[&id("FR-001")].title, "User authentication");

    let service = &merged.units_of_work[&id("UoW-301")];
    assert_eq!(written(&service.implements), vec!["FR-ECOMMERCE-001"]);
    assert_eq!(written(&service.dependencies), vec!["UoW-010"]);

    assert!(composition.report.dangling.is_empty());
    assert_eq!(composition.report.statistics.renamed_identifiers, 1);
    assert_eq!(composition.report.statistics.total_effort_hours, 40);
}

#[test_case(&["ai-ml", "blockchain"], "UoW-BLOCKCHAIN-010"; "ai-ml first")]
#[test_case(&["blockchain", "ai-ml"], "UoW-AIML-010"; "blockchain first")]
fn unit_of_work_collision_depends_on_order(order: &[&str], renamed: &str) {
    let workspace = Workspace::new();
    // The base's UoW-010 is taken, so the first extension is renamed too.
    let extensions = order
        .iter()
        .map(|name| workspace.extension(name, &unit_extension(name)))
        .collect();
    let composition = compose(&workspace.config(extensions)).unwrap();
    let merged = &composition.merged;

    let first_tag = order[0].replace('-', "").to_uppercase();
    let first = id(&format!("UoW-{first_tag}-010"));
    assert!(merged.units_of_work.contains_key(&id("UoW-010")));
    assert!(merged.units_of_work.contains_key(&first));
    assert!(merged.units_of_work.contains_key(&id(renamed)));
    assert_eq!(merged.renames().len(), 2);
    assert_eq!(merged.renames()[1].final_id, id(renamed));
    assert!(composition.report.is_valid());
}

#[test]
fn missing_dependency_is_reported() {
    let workspace = Workspace::new();
    let gdpr = workspace.extension(
        "gdpr",
        r"
non_functional_requirements:
  NFR-100:
    title: Right to erasure
    priority: Critical
    validates:
      - FR-001
      - FR-777
",
    );

    let composition = compose(&workspace.config(vec![gdpr])).unwrap();

    assert_eq!(
        composition.report.dangling,
        vec![DanglingReference {
            from: id("NFR-100"),
            from_kind: ssot::domain::EntityKind::NonFunctional,
            kind: ssot::domain::LinkKind::Validates,
            target: "FR-777".parse().unwrap(),
        }]
    );
    assert!(composition.report.into_result().is_err());
}

#[test]
fn generated_name_taken_falls_back_to_suffix() {
    let workspace = Workspace::new();
    let shop = workspace.extension(
        "shop",
        r"
functional_requirements:
  FR-ECOMMERCE-001:
    title: Coincidence
    priority: Low
",
    );
    let ecommerce = workspace.extension("e-commerce", ECOMMERCE);

    let composition = compose(&workspace.config(vec![shop, ecommerce])).unwrap();
    let merged = &composition.merged;

    assert_eq!(merged.functional[&id("FR-ECOMMERCE-001")].title, "Coincidence");
    let cart = &merged.functional[&id("FR-ECOMMERCE-001-2")];
    assert_eq!(written(&cart.dependencies), vec!["FR-ECOMMERCE-001-2", "FR-001"]);
    assert_eq!(
        written(&merged.units_of_work[&id("UoW-301")].implements),
        vec!["FR-ECOMMERCE-001-2"]
    );
}

#[test]
fn repeated_extension_is_rejected() {
    let workspace = Workspace::new();
    let first = workspace.extension("gdpr", "functional_requirements: {}\n");
    let second = ExtensionSource {
        provenance: Some("gdpr".parse().unwrap()),
        ..workspace.extension("gdpr-2", "functional_requirements: {}\n")
    };

    let error = compose(&workspace.config(vec![first, second])).unwrap_err();
    assert!(matches!(
        error,
        ssot::ComposeError::Merge(MergeError::RepeatedProvenance(_))
    ));
}

#[test_case(
    "functional_requirements:\n  FR-500: {title: A, priority: High}\n  FR-500: {title: B, priority: Low}\n";
    "same section"
)]
#[test_case(
    "functional_requirements:\n  FR-500: {title: A, priority: High}\nnon_functional_requirements:\n  FR-500: {title: B, priority: Low}\n";
    "two sections"
)]
fn duplicate_in_one_extension_is_rejected(content: &str) {
    let workspace = Workspace::new();
    let gdpr = workspace.extension("gdpr", content);

    let error = compose(&workspace.config(vec![gdpr])).unwrap_err();
    let duplicate = error.duplicate().unwrap();
    assert_eq!(duplicate.id, id("FR-500"));
    assert_eq!(duplicate.provenance.as_str(), "gdpr");
}

#[test]
fn source_metadata_reaches_the_artifact() {
    let workspace = Workspace::new();
    let gdpr = workspace.extension(
        "gdpr",
        "metadata:\n  regulation: GDPR\nnon_functional_requirements: {}\n",
    );
    let composition = compose(&workspace.config(vec![gdpr])).unwrap();
    let artifact = Artifact::new(
        "Scenario",
        &composition.merged,
        &composition.sources,
        &composition.report,
        chrono::Utc::now(),
    );

    let value: serde_yaml::Value =
        serde_yaml::from_str(&artifact.render(storage::Format::Yaml).unwrap()).unwrap();
    assert_eq!(
        value["metadata"]["source_metadata"]["gdpr"]["regulation"].as_str(),
        Some("GDPR")
    );
}

#[test]
fn malformed_extension_aborts_before_merging() {
    let workspace = Workspace::new();
    let broken = workspace.extension("broken", "title: not a requirements document\n");

    let error = compose(&workspace.config(vec![broken])).unwrap_err();
    assert!(matches!(error, ssot::ComposeError::Load(_)));
    assert!(error.to_string().contains("broken.yaml"));
}

#[test]
fn plan_file_drives_merge_and_json_output() {
    let workspace = Workspace::new();
    workspace.extension("e-commerce", ECOMMERCE);
    let plan = workspace.root().join("ssot.toml");
    fs::write(
        &plan,
        r#"_version = "1"
project_name = "Shop"
base = "base"
output = "out/merged.json"

[[extensions]]
path = "extensions/e-commerce.yaml"
tag = "ECOMMERC"
"#,
    )
    .unwrap();

    let config = Config::load(&plan).unwrap();
    let composition = compose(&config).unwrap();
    let artifact = Artifact::new(
        &config.project_name,
        &composition.merged,
        &composition.sources,
        &composition.report,
        chrono::Utc::now(),
    );
    artifact.write(&config.output).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(workspace.root().join("out/merged.json")).unwrap())
            .unwrap();
    assert!(json["functional_requirements"]["FR-ECOMMERC-001"].is_object());
    assert_eq!(json["metadata"]["project_name"], "Shop");
    assert_eq!(json["metadata"]["sources"][1]["provenance"], "e-commerce");
    assert_eq!(json["metadata"]["renames"][0]["final"], "FR-ECOMMERC-001");
}
