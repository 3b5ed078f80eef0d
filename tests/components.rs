mod common;

use common::{COMMUNITY_SCHEMA, SyncPair, TestDb};
use pg_env_sync::copier::{BatchedCopy, TableCopy};
use pg_env_sync::reset::reset;
use pg_env_sync::{ForeignKeyEdge, Introspector, SequenceRealigner, Table};
use serial_test::serial;

fn t(name: &str) -> Table {
    Table::new("public", name)
}

#[test]
#[serial]
fn introspects_tables_and_foreign_keys() {
    let db = TestDb::new("introspect");
    db.execute(COMMUNITY_SCHEMA);
    db.execute(
        r#"
        CREATE SCHEMA audit;
        CREATE TABLE audit.events (id SERIAL PRIMARY KEY, post_id BIGINT REFERENCES public.posts(id));
        CREATE VIEW post_titles AS SELECT title FROM posts;
        "#,
    );

    let mut client = db.get_client();
    let introspector = Introspector::new("public");
    let snapshot = introspector.snapshot(&mut *client).unwrap();

    assert_eq!(snapshot.tables, vec![t("communities"), t("posts")]);
    assert!(
        snapshot
            .edges
            .contains(&ForeignKeyEdge::new(t("posts"), t("communities")))
    );
    // Self-references are reported; the resolver ignores them.
    assert!(
        snapshot
            .edges
            .contains(&ForeignKeyEdge::new(t("posts"), t("posts")))
    );
    assert_eq!(snapshot.edges.len(), 2);

    let columns = introspector.list_columns(&mut *client).unwrap();
    assert_eq!(
        columns[&t("communities")],
        vec!["id", "name", "settings", "created_at"]
    );
    let sequences = introspector.list_sequences(&mut *client).unwrap();
    assert_eq!(sequences, vec!["communities_id_seq", "posts_id_seq"]);
}

#[test]
#[serial]
fn reset_twice_leaves_tables_empty() {
    let db = TestDb::new("reset");
    db.execute(COMMUNITY_SCHEMA);
    db.execute(
        r#"
        INSERT INTO communities (name) VALUES ('a'), ('b');
        INSERT INTO posts (community_id, title) VALUES (1, 'x'), (2, 'y');
        "#,
    );
    let tables = vec![t("communities"), t("posts")];
    let mut client = db.get_client();

    let first = reset(&mut *client, &tables);
    assert!(first.bulk);
    assert!(first.is_clean());
    assert_eq!(db.count("communities"), 0);
    assert_eq!(db.count("posts"), 0);

    let second = reset(&mut *client, &tables);
    assert_eq!(first, second);
    assert_eq!(db.count("communities"), 0);
    assert_eq!(db.count("posts"), 0);
}

#[test]
#[serial]
fn reset_falls_back_per_table() {
    let db = TestDb::new("fallback");
    db.execute(COMMUNITY_SCHEMA);
    db.execute("INSERT INTO communities (name) VALUES ('a')");
    let tables = vec![t("communities"), t("missing_table")];
    let mut client = db.get_client();

    let outcome = reset(&mut *client, &tables);

    assert!(!outcome.bulk);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0, t("missing_table"));
    assert_eq!(db.count("communities"), 0);
}

#[test]
#[serial]
fn copies_in_batches_and_maps_columns() {
    let ddl = r#"
        CREATE TYPE mood AS ENUM ('happy', 'sad');
        CREATE TABLE readings (
            id BIGSERIAL PRIMARY KEY,
            taken_on DATE,
            taken_at TIMESTAMP,
            device UUID,
            payload BYTEA,
            mood mood,
            ratio REAL,
            doubled INTEGER GENERATED ALWAYS AS (id * 2) STORED,
            flags BOOLEAN
        );
    "#;
    let pair = SyncPair::with_schema(ddl);
    pair.source
        .execute("ALTER TABLE readings ADD COLUMN legacy TEXT DEFAULT 'old'");
    pair.source.execute(
        r#"
        INSERT INTO readings (taken_on, taken_at, device, payload, mood, ratio, flags)
        SELECT DATE '2024-01-01' + i, TIMESTAMP '2024-01-01 12:00' + i * INTERVAL '1 minute',
               md5(i::text)::uuid, decode('deadbeef', 'hex'),
               CASE WHEN i % 2 = 0 THEN 'happy'::mood ELSE 'sad'::mood END,
               i / 4.0, i % 3 = 0
        FROM generate_series(1, 250) AS i;
        "#,
    );

    let copier = BatchedCopy { batch_size: 100 };
    let mut source = pair.source.get_client();
    let mut target = pair.target.get_client();
    let stats = copier.copy(&t("readings"), &mut source, &mut target).unwrap();

    assert_eq!(stats.source_rows, 250);
    assert_eq!(stats.rows_copied, 250);
    assert_eq!(pair.target.count("readings"), 250);

    let diff: i64 = target
        .query_one(
            r#"SELECT COUNT(*) FROM readings
               WHERE doubled <> id * 2 OR payload <> decode('deadbeef', 'hex')
                  OR device <> md5(id::text)::uuid
                  OR mood <> (CASE WHEN id % 2 = 0 THEN 'happy' ELSE 'sad' END)::mood
                  OR taken_on <> DATE '2024-01-01' + id::int"#,
            &[],
        )
        .unwrap()
        .get(0);
    assert_eq!(diff, 0);
}

#[test]
#[serial]
fn empty_table_is_not_read() {
    let pair = SyncPair::with_schema(COMMUNITY_SCHEMA);
    let copier = BatchedCopy::default();
    let mut source = pair.source.get_client();
    let mut target = pair.target.get_client();

    let stats = copier
        .copy(&t("communities"), &mut source, &mut target)
        .unwrap();

    assert_eq!(stats.source_rows, 0);
    assert_eq!(stats.rows_copied, 0);
}

#[test]
#[serial]
fn realigned_sequence_hands_out_next_id() {
    let db = TestDb::new("sequence");
    db.execute(COMMUNITY_SCHEMA);
    db.execute(
        r#"
        INSERT INTO communities (id, name) VALUES (7, 'a'), (42, 'b');
        CREATE SEQUENCE invoice_number_seq;
        "#,
    );
    let mut client = db.get_client();

    let outcome = SequenceRealigner::new(Introspector::new("public"))
        .realign(&mut *client)
        .unwrap();

    let communities = outcome
        .realigned
        .iter()
        .find(|(owner, _)| owner.sequence == "communities_id_seq")
        .unwrap();
    assert_eq!(communities.1, 42);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].0, "invoice_number_seq");

    let next: i32 = client
        .query_one("INSERT INTO communities (name) VALUES ('c') RETURNING id", &[])
        .unwrap()
        .get(0);
    assert_eq!(next, 43);
    let first_post: i64 = client
        .query_one(
            "INSERT INTO posts (community_id, title) VALUES (7, 'p') RETURNING id",
            &[],
        )
        .unwrap()
        .get(0);
    assert_eq!(first_post, 1);
}

#[test]
#[serial]
fn json_text_is_copied_verbatim() {
    let ddl = r#"
        CREATE TABLE documents (id SERIAL PRIMARY KEY, body JSONB, raw JSON);
    "#;
    let pair = SyncPair::with_schema(ddl);
    pair.source.execute(
        r#"
        INSERT INTO documents (body, raw) VALUES
            ('{"n": 12345678901234567890123, "p": 3.14159265358979323846264}', '{"b": 1, "a": 2}'),
            ('[1e400, -0.000000000000000000001]', '  {"dup": 1, "dup": 2}'),
            (NULL, NULL);
        "#,
    );

    let copier = BatchedCopy::default();
    let mut source = pair.source.get_client();
    let mut target = pair.target.get_client();
    copier
        .copy(&t("documents"), &mut source, &mut target)
        .unwrap();

    let dump = "SELECT id, body::text, raw::text FROM documents ORDER BY id";
    let read = |client: &mut postgres::Client| -> Vec<(i32, Option<String>, Option<String>)> {
        client
            .query(dump, &[])
            .unwrap()
            .iter()
            .map(|row| (row.get(0), row.get(1), row.get(2)))
            .collect()
    };
    let expected = read(&mut *source);
    assert_eq!(read(&mut *target), expected);
    assert_eq!(
        expected[0].1.as_deref(),
        Some(r#"{"n": 12345678901234567890123, "p": 3.14159265358979323846264}"#)
    );
}

#[test]
#[serial]
fn infinite_dates_and_timestamps_are_copied() {
    let ddl = r#"
        CREATE TABLE events (
            id SERIAL PRIMARY KEY,
            starts_at TIMESTAMP,
            ends_at TIMESTAMPTZ,
            valid_until DATE
        );
    "#;
    let pair = SyncPair::with_schema(ddl);
    pair.source.execute(
        r#"
        INSERT INTO events (starts_at, ends_at, valid_until) VALUES
            ('-infinity', 'infinity', 'infinity'),
            ('2024-03-01 08:30:00', '2024-03-01 08:30:00+00', '2024-12-31'),
            ('infinity', '-infinity', '-infinity'),
            (NULL, NULL, NULL);
        "#,
    );

    let copier = BatchedCopy::default();
    let mut source = pair.source.get_client();
    let mut target = pair.target.get_client();
    let stats = copier.copy(&t("events"), &mut source, &mut target).unwrap();
    assert_eq!(stats.rows_copied, 4);

    let dump = "SELECT id, starts_at::text, ends_at::text, valid_until::text FROM events ORDER BY id";
    let read = |client: &mut postgres::Client| -> Vec<(i32, Option<String>, Option<String>, Option<String>)> {
        client
            .query(dump, &[])
            .unwrap()
            .iter()
            .map(|row| (row.get(0), row.get(1), row.get(2), row.get(3)))
            .collect()
    };
    let expected = read(&mut *source);
    assert_eq!(read(&mut *target), expected);
    assert_eq!(expected[0].2.as_deref(), Some("infinity"));
}
