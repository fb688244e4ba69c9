//! End-to-end repository tests against a real PostgreSQL database.
//!
//! Run with: DATABASE_URL=postgres://... cargo test -p rowkit-postgres -- --ignored

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rowkit_core::{
    col, ColumnKind, Entity, Filter, QueryExecutor, Repository, Row, Selection, TableSpec,
};
use rowkit_postgres::{create_pool, PgPoolExecutor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Note {
    id: Option<i64>,
    title: String,
    body: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl Entity for Note {
    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

static NOTES: TableSpec = TableSpec::new(
    "rowkit_notes",
    "id",
    &[
        col("id", ColumnKind::BigInt),
        col("title", ColumnKind::Text),
        col("body", ColumnKind::Text),
        col("created_at", ColumnKind::Timestamp),
    ],
);

fn note(title: &str) -> Note {
    Note {
        id: None,
        title: title.to_string(),
        body: None,
        created_at: None,
    }
}

async fn setup() -> PgPoolExecutor {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();

    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let pool = create_pool(&url).await.expect("pool creation failed");

    sqlx::query("DROP TABLE IF EXISTS rowkit_notes")
        .execute(&pool)
        .await
        .expect("drop table");
    sqlx::query(
        r#"
        CREATE TABLE rowkit_notes (
            id BIGSERIAL PRIMARY KEY,
            title TEXT NOT NULL,
            body TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("create table");

    PgPoolExecutor::new(pool)
}

#[tokio::test]
#[ignore = "requires database"]
async fn crud_round_trip() {
    let executor = setup().await;
    let repo = Repository::<Note>::new(&executor, &NOTES).with_ignore_on_insert(&["created_at"]);

    let mut n = note("first");
    repo.insert(&mut n).await.expect("insert");
    assert!(n.id.is_some());
    assert!(n.created_at.is_some(), "server default written back");

    let found = repo
        .get_by_id(n.id.unwrap())
        .await
        .expect("get_by_id")
        .expect("row exists");
    assert_eq!(found, n);

    n.body = Some("updated body".to_string());
    repo.update(&n).await.expect("update");
    let updated = repo.get_by_id(n.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(updated.body.as_deref(), Some("updated body"));

    let removed = repo.delete_by_id(n.id.unwrap()).await.expect("delete");
    assert_eq!(removed, 1);
    assert!(repo.get_by_id(n.id.unwrap()).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires database"]
async fn batch_insert_populates_ids_in_order() {
    let executor = setup().await;
    let repo = Repository::<Note>::new(&executor, &NOTES).with_ignore_on_insert(&["created_at"]);

    let mut notes = vec![note("a"), note("b"), note("c")];
    repo.insert_many(&mut notes).await.expect("insert_many");

    let ids: Vec<i64> = notes.iter().filter_map(|n| n.id).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

    let titles: Vec<String> = repo
        .get_all(vec![], vec![rowkit_core::Order::asc("id")])
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert_eq!(titles, ["a", "b", "c"]);
}

#[tokio::test]
#[ignore = "requires database"]
async fn dropped_transaction_rolls_back() {
    let executor = setup().await;
    let repo = Repository::<Note>::new(&executor, &NOTES).with_ignore_on_insert(&["created_at"]);

    {
        let tx = executor.begin().await.expect("begin");
        let scoped = repo.scoped(tx.as_ref());
        let mut n = note("doomed");
        scoped.insert(&mut n).await.expect("insert in tx");
        // dropped without commit
    }

    assert!(!repo
        .exists(vec![Filter::eq("title", "doomed")])
        .await
        .unwrap());
}

#[tokio::test]
#[ignore = "requires database"]
async fn committed_transaction_persists_both_rows() {
    let executor = setup().await;
    let repo = Repository::<Note>::new(&executor, &NOTES).with_ignore_on_insert(&["created_at"]);

    let tx = executor.begin().await.expect("begin");
    {
        let scoped = repo.scoped(tx.as_ref());
        let mut a = note("a");
        let mut b = note("b");
        scoped.insert(&mut a).await.expect("insert a");
        scoped.insert(&mut b).await.expect("insert b");
    }
    tx.commit().await.expect("commit");

    let count = repo.get_all(vec![], vec![]).await.unwrap().len();
    assert_eq!(count, 2);
}

#[tokio::test]
#[ignore = "requires database"]
async fn delete_all_requires_the_marker() {
    let executor = setup().await;
    let repo = Repository::<Note>::new(&executor, &NOTES).with_ignore_on_insert(&["created_at"]);

    let mut n = note("only");
    repo.insert(&mut n).await.unwrap();

    assert!(repo.delete(Selection::Where(vec![])).await.is_err());
    assert_eq!(repo.delete(Selection::All).await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires database"]
async fn update_values_uses_typed_nulls() {
    let executor = setup().await;
    let repo = Repository::<Note>::new(&executor, &NOTES).with_ignore_on_insert(&["created_at"]);

    let mut n = Note {
        body: Some("text".to_string()),
        ..note("nullable")
    };
    repo.insert(&mut n).await.unwrap();

    let affected = repo
        .update_values(
            vec![Filter::eq("title", "nullable")],
            Row::new().with("body", rowkit_core::Value::Null),
        )
        .await
        .expect("update_values");
    assert_eq!(affected, 1);

    let stored = repo.get_by_id(n.id.unwrap()).await.unwrap().unwrap();
    assert!(stored.body.is_none());
}
