//! Backend tests against live database engines.
//!
//! Run with a DATABASES-style record list naming disposable engines:
//! ```bash
//! STORAGE_TEST_DATABASES="it:mariadb:127.0.0.1:3306:root:root;it:pgsql:127.0.0.1:5432:postgres:postgres" \
//!     cargo test --test backend_integration_test -- --ignored --test-threads=1
//! ```

use uuid::Uuid;

use storage_service::infra::{BackendFactory, BackendRegistry, SqlBackendFactory};
use storage_service::{Backend, BackendFamily, ProvisionError};

fn registry() -> Option<BackendRegistry> {
    let records = std::env::var("STORAGE_TEST_DATABASES").ok()?;
    Some(BackendRegistry::parse(&records).expect("STORAGE_TEST_DATABASES must parse"))
}

/// Unique, allow-listed name so reruns never collide
fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", &Uuid::new_v4().simple().to_string()[..12])
}

fn backends() -> Vec<(String, Box<dyn Backend>)> {
    let Some(registry) = registry() else {
        eprintln!("STORAGE_TEST_DATABASES not set, skipping");
        return Vec::new();
    };

    registry
        .iter()
        .map(|(key, config)| (key.to_string(), SqlBackendFactory.build(config)))
        .collect()
}

#[tokio::test]
#[ignore = "requires live database engines"]
async fn check_connection_reaches_every_engine() {
    for (key, backend) in backends() {
        backend
            .check_connection()
            .await
            .unwrap_or_else(|e| panic!("{key}: {e}"));
    }
}

#[tokio::test]
#[ignore = "requires live database engines"]
async fn create_change_password_and_delete() {
    for (key, backend) in backends() {
        let name = unique_name("it");
        let reader = format!("{name}_ro");

        backend.create_user(&name, "first'pass", &name).await.unwrap();
        backend
            .create_database(&name, &name, &[])
            .await
            .unwrap_or_else(|e| panic!("{key}: {e}"));
        backend
            .create_ro_user(&reader, "reader\"pass", &name)
            .await
            .unwrap_or_else(|e| panic!("{key}: {e}"));
        backend
            .change_password(&name, "second\\pass")
            .await
            .unwrap_or_else(|e| panic!("{key}: {e}"));

        backend.drop_database(&name).await.unwrap();
        backend.drop_user(&reader).await.unwrap();
        backend.drop_user(&name).await.unwrap();
    }
}

#[tokio::test]
#[ignore = "requires live database engines"]
async fn repeated_create_user_fails_with_engine_error() {
    for (_, backend) in backends() {
        let name = unique_name("dup");

        backend.create_user(&name, "pw", &name).await.unwrap();
        let err = backend.create_user(&name, "pw", &name).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Backend { step: "create user", .. }));
        assert!(err.report_message().starts_with("backend problem: create user failed"));

        backend.drop_user(&name).await.unwrap();
    }
}

#[tokio::test]
#[ignore = "requires live database engines"]
async fn postgres_extensions_land_in_database_schema() {
    for (key, backend) in backends() {
        if backend.kind() != BackendFamily::Postgres {
            continue;
        }
        let name = unique_name("ext");

        backend.create_user(&name, "pw", &name).await.unwrap();
        backend
            .create_database(&name, &name, &["hstore".to_string()])
            .await
            .unwrap_or_else(|e| panic!("{key}: {e}"));

        backend.drop_database(&name).await.unwrap();
        backend.drop_user(&name).await.unwrap();
    }
}

#[tokio::test]
#[ignore = "requires live database engines"]
async fn dropping_missing_database_fails() {
    for (_, backend) in backends() {
        let err = backend
            .drop_database(&unique_name("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Backend { step: "drop database", .. }));
    }
}
