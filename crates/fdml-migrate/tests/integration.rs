use std::fs;
use std::path::Path;

use fdml_core::Document;
use fdml_migrate::{
    Change, DownOptions, MemoryBackend, MigrationError, MigrationPhase, MigrationSet, Migrator,
    ProjectConfig, StateStore, UpOptions,
};
use fdml_validate::RuleCode;
use tempfile::TempDir;

const SHOP: &str = "\
entities:
  - id: user
    fields:
      - name: email
        type: string
        required: true
      - name: age
        type: integer
constraints:
  - id: adult
    applies_to: [user]
    condition: user.age >= 18
";

// Depends on ORDER_TOTAL's dependency, but sorts after it by id.
const ORDERS: &str = "\
migration:
  id: m2_orders
  up:
    - add_entity:
        id: order
        fields:
          - {name: id, type: uuid, required: true}
  down:
    - remove_entity: order
";

const ORDER_TOTAL: &str = "\
id: m1_order_total
depends_on: [m2_orders]
up:
  - add_field:
      entity_id: order
      field_name: total
      field_type: float
down:
  - remove_field:
      entity_id: order
      field_name: total
";

const DROP_USER: &str = "\
id: m3_drop_user
up:
  - remove_entity: user
down:
  - add_entity:
      id: user
      fields: []
";

// Adds a second `email` to `user`; its down would drop both.
const RETYPE_EMAIL: &str = "\
id: m4_retype_email
up:
  - modify_entity:
      id: user
      add_fields:
        - {name: email, type: integer}
down:
  - modify_entity:
      id: user
      remove_fields: [email]
";

fn project(migrations: &[(&str, &str)]) -> (TempDir, ProjectConfig) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("fdml.toml"),
        "[project]\nname = \"shop\"\nspec = \"shop.fdml\"\n",
    )
    .unwrap();
    fs::write(dir.path().join("shop.fdml"), SHOP).unwrap();
    let migrations_dir = dir.path().join("migrations");
    fs::create_dir_all(&migrations_dir).unwrap();
    for (name, body) in migrations {
        fs::write(migrations_dir.join(name), body).unwrap();
    }
    let config = ProjectConfig::find_and_load(dir.path()).unwrap().unwrap();
    (dir, config)
}

fn spec(config: &ProjectConfig) -> Document {
    fdml_parse::parse(&fs::read_to_string(config.spec_path()).unwrap()).unwrap()
}

fn backups(dir: &Path) -> usize {
    match fs::read_dir(dir) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

#[test]
fn dependency_order_wins_over_discovery_order() {
    // "a_" sorts first on disk but depends on the other file's migration.
    let (_dir, config) = project(&[("a_total.yaml", ORDER_TOTAL), ("b_orders.yaml", ORDERS)]);
    let mut migrator = config.migrator().unwrap();

    let outcome = migrator.up(&UpOptions::default()).unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.ids(), vec!["m2_orders", "m1_order_total"]);

    let doc = spec(&config);
    let order = doc.entity("order").unwrap();
    let fields: Vec<&str> = order.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(fields, vec!["id", "total"]);

    let state = StateStore::open(config.state_file()).load().unwrap();
    assert_eq!(state.ids().collect::<Vec<_>>(), vec!["m2_orders", "m1_order_total"]);
    assert_eq!(backups(&config.backup_dir()), 2);
}

#[test]
fn failed_validation_restores_document_and_keeps_earlier_steps() {
    let (_dir, config) = project(&[("orders.yaml", ORDERS), ("drop_user.yaml", DROP_USER)]);
    let mut migrator = config.migrator().unwrap();

    let outcome = migrator.up(&UpOptions::default()).unwrap();
    assert_eq!(outcome.ids(), vec!["m2_orders"]);
    let Some(MigrationError::MigrationFailed { id, report }) = &outcome.halted else {
        panic!("expected MigrationFailed, got {:?}", outcome.halted);
    };
    assert_eq!(id, "m3_drop_user");
    assert!(report
        .errors()
        .any(|f| f.rule == RuleCode::ReferenceIntegrity && f.element_id == "adult"));

    let doc = spec(&config);
    assert!(doc.entity("user").is_some());
    assert!(doc.entity("order").is_some());

    let status = migrator.status().unwrap();
    assert_eq!(status.get("m2_orders").unwrap().phase, MigrationPhase::Applied);
    assert_eq!(status.get("m3_drop_user").unwrap().phase, MigrationPhase::Pending);

    // Backups taken before each attempted migration are kept.
    assert_eq!(backups(&config.backup_dir()), 2);
}

#[test]
fn conflicting_field_add_fails_and_keeps_original_field() {
    let (_dir, config) = project(&[("retype.yaml", RETYPE_EMAIL)]);
    let mut migrator = config.migrator().unwrap();

    let outcome = migrator.up(&UpOptions::default()).unwrap();
    assert!(outcome.ids().is_empty());
    let Some(MigrationError::MigrationFailed { id, report }) = &outcome.halted else {
        panic!("expected MigrationFailed, got {:?}", outcome.halted);
    };
    assert_eq!(id, "m4_retype_email");
    assert!(report
        .errors()
        .any(|f| f.rule == RuleCode::UniqueId && f.element_id == "user"));

    let doc = spec(&config);
    assert_eq!(doc, fdml_parse::parse(SHOP).unwrap());
    let email = doc.entity("user").unwrap().field("email").unwrap();
    assert_eq!(email.data_type, fdml_core::DataType::String);

    let status = migrator.status().unwrap();
    assert_eq!(status.get("m4_retype_email").unwrap().phase, MigrationPhase::Pending);
    let down = migrator.down(&DownOptions::default()).unwrap();
    assert!(down.ids().is_empty());
    assert_eq!(spec(&config), doc);
}

#[test]
fn up_then_down_restores_document() {
    let original = fdml_parse::parse(SHOP).unwrap();
    let migrations = vec![
        fdml_parse::parse_migration(ORDERS).unwrap(),
        fdml_parse::parse_migration(ORDER_TOTAL).unwrap(),
    ];
    let dir = tempfile::tempdir().unwrap();
    let mut migrator = Migrator::new(
        MemoryBackend::new(original.clone()),
        StateStore::open(dir.path().join("state.json")),
        MigrationSet::from_migrations(migrations).unwrap(),
    );

    migrator.up(&UpOptions::default()).unwrap().into_result().unwrap();
    assert_ne!(migrator.backend().document(), &original);

    let outcome = migrator
        .down(&DownOptions {
            count: 10,
            ..DownOptions::default()
        })
        .unwrap();
    assert_eq!(outcome.ids(), vec!["m1_order_total", "m2_orders"]);
    assert_eq!(migrator.backend().document(), &original);
    assert!(migrator.store().load().unwrap().is_empty());
}

#[test]
fn cycle_applies_nothing() {
    let (_dir, config) = project(&[
        ("x.yaml", "id: x\ndepends_on: [y]\nup: []\n"),
        ("y.yaml", "id: y\ndepends_on: [x]\nup: []\n"),
        ("orders.yaml", ORDERS),
    ]);
    let mut migrator = config.migrator().unwrap();

    let err = migrator.up(&UpOptions::default()).unwrap_err();
    let MigrationError::CircularDependency { cycle } = err else {
        panic!("expected CircularDependency, got {err:?}");
    };
    assert!(cycle.contains(&"x".to_string()) && cycle.contains(&"y".to_string()));
    assert_eq!(cycle.first(), cycle.last());

    assert!(spec(&config).entity("order").is_none());
    assert!(!config.state_file().exists());
}

#[test]
fn concurrent_batch_fails_fast() {
    let (_dir, config) = project(&[("orders.yaml", ORDERS)]);
    let mut migrator = config.migrator().unwrap();

    let held = StateStore::open(config.state_file()).lock().unwrap();
    let err = migrator.up(&UpOptions::default()).unwrap_err();
    assert!(matches!(err, MigrationError::StateLocked { .. }));

    // A dry run only reads the state.
    let preview = migrator
        .up(&UpOptions {
            to: None,
            dry_run: true,
        })
        .unwrap();
    assert_eq!(preview.ids(), vec!["m2_orders"]);

    drop(held);
    assert_eq!(migrator.up(&UpOptions::default()).unwrap().ids(), vec!["m2_orders"]);
}

#[test]
fn transitions_are_enforced() {
    let (_dir, config) = project(&[("orders.yaml", ORDERS)]);
    let mut migrator = config.migrator().unwrap();

    let err = migrator
        .down(&DownOptions {
            target: Some("m2_orders".into()),
            ..DownOptions::default()
        })
        .unwrap_err();
    assert!(matches!(
        err,
        MigrationError::InvalidTransition {
            from: MigrationPhase::Pending,
            to: MigrationPhase::RollingBack,
            ..
        }
    ));

    migrator.apply("m2_orders").unwrap();
    let err = migrator.apply("m2_orders").unwrap_err();
    assert!(matches!(
        err,
        MigrationError::InvalidTransition {
            from: MigrationPhase::Applied,
            to: MigrationPhase::Applying,
            ..
        }
    ));
}

#[test]
fn dependents_block_rollback_unless_forced() {
    let (_dir, config) = project(&[("orders.yaml", ORDERS), ("total.yaml", ORDER_TOTAL)]);
    let mut migrator = config.migrator().unwrap();
    migrator.up(&UpOptions::default()).unwrap();

    let target = DownOptions {
        target: Some("m2_orders".into()),
        ..DownOptions::default()
    };
    let err = migrator.down(&target).unwrap_err();
    let MigrationError::DependentMigrationsExist { id, blocking_ids } = err else {
        panic!("expected DependentMigrationsExist, got {err:?}");
    };
    assert_eq!(id, "m2_orders");
    assert_eq!(blocking_ids, vec!["m1_order_total".to_string()]);
    assert_eq!(StateStore::open(config.state_file()).load().unwrap().len(), 2);

    let outcome = migrator
        .down(&DownOptions {
            force: true,
            ..target
        })
        .unwrap();
    assert_eq!(outcome.ids(), vec!["m1_order_total", "m2_orders"]);
    assert!(spec(&config).entity("order").is_none());
    assert!(StateStore::open(config.state_file()).load().unwrap().is_empty());
}

#[test]
fn edited_definition_is_reported_as_drift() {
    let (dir, config) = project(&[("orders.yaml", ORDERS)]);
    config.migrator().unwrap().up(&UpOptions::default()).unwrap();

    let status = config.migrator().unwrap().status().unwrap();
    assert_eq!(status.drifted().count(), 0);

    let edited = ORDERS.replace("{name: id, type: uuid, required: true}", "{name: id, type: string}");
    fs::write(dir.path().join("migrations").join("orders.yaml"), edited).unwrap();

    let status = config.migrator().unwrap().status().unwrap();
    let orders = status.get("m2_orders").unwrap();
    assert_eq!(orders.phase, MigrationPhase::Applied);
    assert!(orders.drifted);
    assert!(status.to_string().contains("DRIFTED"));
}

#[test]
fn dry_run_reports_diff_without_writing() {
    let (_dir, config) = project(&[("orders.yaml", ORDERS), ("total.yaml", ORDER_TOTAL)]);
    let mut migrator = config.migrator().unwrap();

    let outcome = migrator
        .up(&UpOptions {
            to: None,
            dry_run: true,
        })
        .unwrap();
    assert!(outcome.dry_run);
    assert_eq!(outcome.ids(), vec!["m2_orders", "m1_order_total"]);

    let added: Vec<&str> = outcome.steps[0]
        .diff
        .changes(Change::Added)
        .map(|e| e.id.as_str())
        .collect();
    assert_eq!(added, vec!["order"]);
    let modified: Vec<&str> = outcome.steps[1]
        .diff
        .changes(Change::Modified)
        .map(|e| e.id.as_str())
        .collect();
    assert_eq!(modified, vec!["order"]);
    assert!(outcome.steps.iter().all(|s| s.backup.is_none()));

    assert_eq!(fs::read_to_string(config.spec_path()).unwrap(), SHOP);
    assert!(!config.state_file().exists());
    assert_eq!(backups(&config.backup_dir()), 0);
}

#[test]
fn broken_file_does_not_block_others() {
    let (_dir, config) = project(&[
        ("orders.yaml", ORDERS),
        ("broken.yaml", "id: broken\nup:\n  - frobnicate: user\n"),
    ]);
    let mut migrator = config.migrator().unwrap();
    assert_eq!(migrator.migrations().errors().len(), 1);
    assert!(matches!(
        migrator.migrations().errors()[0],
        MigrationError::Parse { .. }
    ));
    assert_eq!(migrator.up(&UpOptions::default()).unwrap().ids(), vec!["m2_orders"]);
}
