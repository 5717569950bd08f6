//! Round trips against a real database.
//!
//! Runs only when `DATABASE_URL` is set (a `.env` file is honored). Every test
//! works on session-local temporary tables.

use pgshape::{
    ConnectOptions, Data, Engine, EngineConfig, JoinSpec, OrmError, PgConnection, QuerySpec,
    Relation, TxControl, Value, Where, raw,
};

async fn try_connect(config: EngineConfig) -> Option<Engine<PgConnection>> {
    let _ = dotenvy::dotenv();
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let options = ConnectOptions::from_url(database_url).application_name("pgshape-tests");
    Some(
        Engine::connect(&options, config)
            .await
            .expect("Failed to connect to DATABASE_URL"),
    )
}

async fn setup(db: &mut Engine<PgConnection>) {
    for ddl in [
        "CREATE TEMP TABLE <users> (<id> BIGSERIAL PRIMARY KEY, <name> TEXT NOT NULL, \
         <age> INT, <score> DOUBLE PRECISION, <active> BOOLEAN NOT NULL DEFAULT TRUE, <role_id> INT)",
        "CREATE TEMP TABLE <roles> (<id> INT PRIMARY KEY, <title> TEXT NOT NULL)",
    ] {
        db.query(&raw(ddl)).await.unwrap();
        assert!(db.error().is_none(), "{:?}", db.error_info());
    }
}

#[tokio::test]
async fn insert_select_update_delete() {
    let Some(mut db) = try_connect(EngineConfig::new()).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    setup(&mut db).await;

    let inserted = db
        .insert(
            "users",
            &[
                Data::new().set("name", "ann").set("age", 31).set("score", 1.5).set("active", true),
                Data::new().set("name", "bob").set("age", 17),
                Data::new().set("name", "o'neil").set("active", false),
            ],
        )
        .await
        .unwrap();
    assert_eq!(inserted, Some(3));
    assert_eq!(db.last_insert_id(None).await.unwrap().as_deref(), Some("3"));

    let rows = db
        .select(
            &QuerySpec::new("users")
                .columns(vec!["id", "name", "score"])
                .filter(Where::new().gte("age", 18).eq("active", true)),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].try_get::<String>("name").unwrap(), "ann");
    assert_eq!(rows[0].get("score"), Some(&Value::Float(1.5)));

    let updated = db
        .update(
            "users",
            &Data::new().set_raw("age", raw("COALESCE(<age>, 0) + :n").bind("n", 1)),
            Some(&Where::new().in_list("name", ["bob", "o'neil"])),
        )
        .await
        .unwrap();
    assert_eq!(updated, Some(2));

    let rows = db
        .select(&QuerySpec::new("users").columns(vec!["age"]).filter(Where::new().order_by("id")))
        .await
        .unwrap()
        .unwrap();
    let ages: Vec<i64> = rows.iter().map(|r| r.try_get("age").unwrap()).collect();
    assert_eq!(ages, vec![31, 18, 1]);

    let deleted = db
        .delete("users", Some(&Where::new().is_null("score")))
        .await
        .unwrap();
    assert_eq!(deleted, Some(2));
}

#[tokio::test]
async fn join_and_limit() {
    let Some(mut db) = try_connect(EngineConfig::new()).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    setup(&mut db).await;

    db.insert(
        "roles",
        &[Data::new().set("id", 1).set("title", "admin"), Data::new().set("id", 2).set("title", "user")],
    )
    .await
    .unwrap();
    db.insert(
        "users",
        &[
            Data::new().set("name", "a").set("role_id", 1),
            Data::new().set("name", "b").set("role_id", 2),
            Data::new().set("name", "c").set("role_id", 2),
        ],
    )
    .await
    .unwrap();

    let rows = db
        .select(
            &QuerySpec::new("users")
                .join(JoinSpec::new().join("[><]roles(r)", Relation::on([("role_id", "id")])))
                .columns(vec!["users.name", "r.title(role)"])
                .filter(Where::new().eq("r.title", "user").order_desc("users.name").limit_offset(1, 5)),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].try_get::<String>("name").unwrap(), "b");
    assert_eq!(rows[0].try_get::<String>("role").unwrap(), "user");
}

#[tokio::test]
async fn driver_errors_are_stored() {
    let Some(mut db) = try_connect(EngineConfig::new()).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };

    let rows = db.select(&QuerySpec::new("no_such_table_here")).await.unwrap();
    assert!(rows.is_none());
    assert_eq!(db.error_info().unwrap().sqlstate, "42P01");
    assert!(db.last().unwrap().contains("no_such_table_here"));
}

#[tokio::test]
async fn transactional_callback_rolls_back() {
    let Some(mut db) = try_connect(EngineConfig::new()).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    setup(&mut db).await;

    let compiled = db
        .compiler()
        .insert("users", &[Data::new().set("name", "tx")])
        .unwrap();
    let err = db
        .exec_with(&compiled.sql, compiled.binds, |stmt| {
            Box::pin(async move {
                use pgshape::Statement;
                stmt.execute()
                    .await
                    .map_err(|info| OrmError::Other(info.to_string()))?;
                Ok(TxControl::Abort)
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::TransactionAborted));

    let rows = db.select(&QuerySpec::new("users")).await.unwrap().unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn server_info_reports_version() {
    let Some(db) = try_connect(EngineConfig::new()).await else {
        eprintln!("DATABASE_URL not set; skipping");
        return;
    };
    let info = db.info().await.unwrap();
    assert!(!info.server_version.is_empty());
    assert_eq!(info.protocol_version, pgshape::pg::PROTOCOL_VERSION);
    assert_eq!(info.connection, "open");
}
