use vibecore::access::Value;
use vibecore::config::EngineConfig;
use vibecore::database::Database;
use vibecore::error::SqlError;
use vibecore::session::Session;

fn setup(db: &Database, statements: &[&str]) -> Session {
    let mut session = db.session();
    for sql in statements {
        session.execute(sql).unwrap();
    }
    session
}

fn column(session: &mut Session, sql: &str) -> Vec<Value> {
    session
        .execute(sql)
        .unwrap()
        .rows()
        .expect("query result")
        .first_column()
}

fn ints(values: &[i32]) -> Vec<Value> {
    values.iter().map(|&v| Value::Int32(v)).collect()
}

#[test]
fn test_unique_violation_names_constraint_and_key() {
    let db = Database::default();
    let mut s = setup(
        &db,
        &[
            "CREATE TABLE t (a INT, b INT, CONSTRAINT uq_a UNIQUE (a))",
            "INSERT INTO t VALUES (1, 10)",
        ],
    );
    let err = s.execute("INSERT INTO t VALUES (1, 20)").unwrap_err();
    assert_eq!(
        err,
        SqlError::UniqueViolation {
            constraint: "uq_a".to_string(),
            table: "t".to_string(),
            key: "1".to_string(),
        }
    );
    assert_eq!(column(&mut s, "SELECT b FROM t"), ints(&[10]));
}

#[test]
fn test_foreign_key_key_must_fit_parent_exactly() {
    let db = Database::default();
    let mut s = setup(
        &db,
        &[
            "CREATE TABLE parent (id INT PRIMARY KEY)",
            "CREATE TABLE fractional (v DOUBLE, FOREIGN KEY (v) REFERENCES parent (id))",
            "CREATE TABLE wide (v BIGINT, \
             CONSTRAINT fk_wide FOREIGN KEY (v) REFERENCES parent (id))",
            "INSERT INTO parent VALUES (2)",
        ],
    );
    assert!(matches!(
        s.execute("INSERT INTO fractional VALUES (1.5)"),
        Err(SqlError::ForeignKeyViolation { .. })
    ));
    s.execute("INSERT INTO fractional VALUES (2.0)").unwrap();
    assert_eq!(
        s.execute("INSERT INTO wide VALUES (3000000000)").unwrap_err(),
        SqlError::ForeignKeyViolation {
            constraint: "fk_wide".to_string(),
            table: "parent".to_string(),
            key: "3000000000".to_string(),
        }
    );
    assert_eq!(
        column(&mut s, "SELECT COUNT(*) FROM fractional"),
        vec![Value::BigInt(1)]
    );
}

#[test]
fn test_foreign_key_requires_parent_unless_null() {
    let db = Database::default();
    let mut s = setup(
        &db,
        &[
            "CREATE TABLE parent (id INT PRIMARY KEY)",
            "CREATE TABLE child (pid INT, FOREIGN KEY (pid) REFERENCES parent (id))",
            "INSERT INTO parent VALUES (1)",
        ],
    );
    assert!(matches!(
        s.execute("INSERT INTO child VALUES (99)"),
        Err(SqlError::ForeignKeyViolation { .. })
    ));
    s.execute("INSERT INTO child VALUES (NULL)").unwrap();
    s.execute("INSERT INTO child VALUES (1)").unwrap();
    assert_eq!(
        column(&mut s, "SELECT COUNT(*) FROM child"),
        vec![Value::BigInt(2)]
    );
}

#[test]
fn test_null_keys_never_match() {
    let db = Database::default();
    let mut s = setup(
        &db,
        &[
            "CREATE TABLE p (a INT, b INT, PRIMARY KEY (a, b))",
            "CREATE TABLE simple (x INT, y INT, FOREIGN KEY (x, y) REFERENCES p)",
            "CREATE TABLE full_match (x INT, y INT, FOREIGN KEY (x, y) REFERENCES p MATCH FULL)",
            "CREATE TABLE u (v INT UNIQUE)",
            "INSERT INTO p VALUES (1, 2)",
        ],
    );

    s.execute("INSERT INTO simple VALUES (7, NULL)").unwrap();
    assert!(matches!(
        s.execute("INSERT INTO full_match VALUES (7, NULL)"),
        Err(SqlError::ForeignKeyViolation { .. })
    ));
    s.execute("INSERT INTO full_match VALUES (NULL, NULL)").unwrap();
    s.execute("INSERT INTO full_match VALUES (1, 2)").unwrap();

    s.execute("INSERT INTO u VALUES (NULL), (NULL), (3)").unwrap();
    assert!(matches!(
        s.execute("INSERT INTO u VALUES (3)"),
        Err(SqlError::UniqueViolation { .. })
    ));
}

#[test]
fn test_having_with_subquery() {
    let db = Database::default();
    let mut s = setup(
        &db,
        &[
            "CREATE TABLE t (a INT)",
            "INSERT INTO t VALUES (1), (2), (2), (3)",
        ],
    );
    assert!(column(
        &mut s,
        "SELECT a FROM t GROUP BY a HAVING a > (SELECT MAX(a) FROM t)"
    )
    .is_empty());
    assert_eq!(
        column(
            &mut s,
            "SELECT a FROM t GROUP BY a HAVING a > (SELECT MIN(a) FROM t) ORDER BY a"
        ),
        ints(&[2, 3])
    );
    assert!(matches!(
        s.execute("SELECT a FROM t GROUP BY a HAVING COUNT(*) > 1 AND b = 1"),
        Err(SqlError::UnresolvedColumn(_))
    ));
}

#[test]
fn test_recursive_query_reaches_fixed_point() {
    let sql = "WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM r WHERE n < 5) \
               SELECT n FROM r ORDER BY n";

    let db = Database::default();
    let mut s = db.session();
    assert_eq!(column(&mut s, sql), ints(&[1, 2, 3, 4, 5]));

    let exact = Database::new(EngineConfig::default().with_max_recursive_rounds(5));
    assert_eq!(column(&mut exact.session(), sql), ints(&[1, 2, 3, 4, 5]));

    let limited = Database::new(EngineConfig::default().with_max_recursive_rounds(4));
    assert_eq!(
        limited.session().execute(sql).unwrap_err(),
        SqlError::RecursionLimitExceeded { limit: 4 }
    );
}

#[test]
fn test_non_expansive_recursion_stops_after_one_round() {
    let db = Database::new(EngineConfig::default().with_max_recursive_rounds(1));
    let mut s = db.session();
    assert_eq!(
        column(
            &mut s,
            "WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL SELECT n FROM r WHERE FALSE) \
             SELECT n FROM r"
        ),
        ints(&[1])
    );
}

#[test]
fn test_work_table_subquery_sees_each_round() {
    let db = Database::default();
    let mut s = db.session();
    assert_eq!(
        column(
            &mut s,
            "WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL \
             SELECT n + (SELECT MAX(n) FROM r) FROM r WHERE n < 20) \
             SELECT n FROM r ORDER BY n"
        ),
        ints(&[1, 2, 4, 8, 16, 32])
    );
    assert_eq!(
        column(
            &mut s,
            "WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL \
             SELECT n + 1 FROM r WHERE n < (SELECT COUNT(*) FROM r) + 3) \
             SELECT n FROM r ORDER BY n"
        ),
        ints(&[1, 2, 3, 4])
    );
}

#[test]
fn test_recursive_union_drops_repeated_rows() {
    let cycle = |all: &str| {
        format!(
            "WITH RECURSIVE r(n) AS (SELECT 0 UNION {} SELECT MOD(n + 1, 3) FROM r) \
             SELECT n FROM r ORDER BY n",
            all
        )
    };
    let db = Database::new(EngineConfig::default().with_max_recursive_rounds(10));
    let mut s = db.session();
    assert_eq!(column(&mut s, &cycle("")), ints(&[0, 1, 2]));
    assert_eq!(
        s.execute(&cycle("ALL")).unwrap_err(),
        SqlError::RecursionLimitExceeded { limit: 10 }
    );
}

#[test]
fn test_referential_actions() {
    let db = Database::default();
    let mut s = setup(
        &db,
        &[
            "CREATE TABLE p (id INT PRIMARY KEY)",
            "CREATE TABLE cascade_c (pid INT REFERENCES p ON DELETE CASCADE ON UPDATE CASCADE)",
            "CREATE TABLE null_c (pid INT REFERENCES p ON DELETE SET NULL)",
            "INSERT INTO p VALUES (1), (2)",
            "INSERT INTO cascade_c VALUES (1), (2)",
            "INSERT INTO null_c VALUES (1)",
        ],
    );

    assert_eq!(
        s.execute("UPDATE p SET id = 20 WHERE id = 2")
            .unwrap()
            .update_count(),
        Some(1)
    );
    assert_eq!(
        column(&mut s, "SELECT pid FROM cascade_c ORDER BY pid"),
        ints(&[1, 20])
    );

    s.execute("DELETE FROM p WHERE id = 1").unwrap();
    assert_eq!(column(&mut s, "SELECT pid FROM cascade_c"), ints(&[20]));
    assert_eq!(column(&mut s, "SELECT pid FROM null_c"), vec![Value::Null]);
}

#[test]
fn test_restrict_and_no_action_keep_rows() {
    let db = Database::default();
    let mut s = setup(
        &db,
        &[
            "CREATE TABLE p (id INT PRIMARY KEY)",
            "CREATE TABLE r (pid INT REFERENCES p ON DELETE RESTRICT)",
            "CREATE TABLE n (pid INT REFERENCES p)",
            "INSERT INTO p VALUES (1), (2), (3)",
            "INSERT INTO r VALUES (1)",
            "INSERT INTO n VALUES (2)",
        ],
    );
    assert!(matches!(
        s.execute("DELETE FROM p WHERE id = 1"),
        Err(SqlError::ForeignKeyRestrict { .. })
    ));
    assert!(matches!(
        s.execute("DELETE FROM p"),
        Err(SqlError::ForeignKeyRestrict { .. })
    ));
    assert_eq!(
        column(&mut s, "SELECT id FROM p ORDER BY id"),
        ints(&[1, 2, 3])
    );
    s.execute("DELETE FROM p WHERE id = 3").unwrap();
}

#[test]
fn test_check_constraint_survives_alter_table() {
    let db = Database::default();
    let mut s = setup(
        &db,
        &[
            "CREATE TABLE t (a INT, b INT, CONSTRAINT ck CHECK (b > a))",
            "INSERT INTO t VALUES (1, 2)",
            "ALTER TABLE t ADD COLUMN c VARCHAR(10) DEFAULT 'new'",
        ],
    );
    assert_eq!(
        s.execute("INSERT INTO t VALUES (5, 4, 'x')").unwrap_err(),
        SqlError::CheckViolation {
            constraint: "ck".to_string(),
            table: "t".to_string(),
        }
    );
    s.execute("INSERT INTO t (a, b) VALUES (4, 5)").unwrap();
    assert_eq!(
        column(&mut s, "SELECT c FROM t ORDER BY a"),
        vec![Value::String("new".into()), Value::String("new".into())]
    );

    assert!(matches!(
        s.execute("ALTER TABLE t DROP COLUMN a"),
        Err(SqlError::DependentObjects(_))
    ));
    s.execute("ALTER TABLE t DROP CONSTRAINT ck").unwrap();
    s.execute("ALTER TABLE t DROP COLUMN a").unwrap();
    assert_eq!(
        column(&mut s, "SELECT b FROM t ORDER BY b"),
        ints(&[2, 5])
    );
}

#[test]
fn test_check_text_round_trips() {
    let db = Database::default();
    let mut s = setup(
        &db,
        &["CREATE TABLE t (a INT, b VARCHAR(10), \
           CONSTRAINT ck CHECK (a BETWEEN 1 AND 9 OR b LIKE 'x%'))"],
    );
    let sql = db
        .catalog()
        .get_table("t")
        .unwrap()
        .get_constraint("ck")
        .unwrap()
        .get_sql();
    let copy = sql.replacen("CONSTRAINT ck", "CONSTRAINT ck2", 1);
    s.execute(&format!("CREATE TABLE t2 (a INT, b VARCHAR(10), {})", copy))
        .unwrap();

    for table in ["t", "t2"] {
        s.execute(&format!("INSERT INTO {} VALUES (5, 'a')", table))
            .unwrap();
        s.execute(&format!("INSERT INTO {} VALUES (50, 'xyz')", table))
            .unwrap();
        assert!(matches!(
            s.execute(&format!("INSERT INTO {} VALUES (50, 'abc')", table)),
            Err(SqlError::CheckViolation { .. })
        ));
    }
}

#[test]
fn test_drop_table_refused_while_referenced() {
    let db = Database::default();
    let mut s = setup(
        &db,
        &[
            "CREATE TABLE p (id INT PRIMARY KEY)",
            "CREATE TABLE c (pid INT REFERENCES p)",
        ],
    );
    assert!(matches!(
        s.execute("DROP TABLE p"),
        Err(SqlError::DependentObjects(_))
    ));
    s.execute("DROP TABLE c").unwrap();
    s.execute("DROP TABLE p").unwrap();
    assert!(db.list_tables().is_empty());
}

#[test]
fn test_set_operations_and_joins() {
    let db = Database::default();
    let mut s = setup(
        &db,
        &[
            "CREATE TABLE a (x INT, label VARCHAR(10))",
            "CREATE TABLE b (x INT)",
            "INSERT INTO a VALUES (1, 'one'), (2, 'two'), (3, 'three')",
            "INSERT INTO b VALUES (2), (3), (4)",
        ],
    );
    assert_eq!(
        column(&mut s, "SELECT x FROM a UNION SELECT x FROM b ORDER BY 1"),
        ints(&[1, 2, 3, 4])
    );
    assert_eq!(
        column(&mut s, "SELECT x FROM a EXCEPT SELECT x FROM b"),
        ints(&[1])
    );
    assert_eq!(
        column(
            &mut s,
            "SELECT a.label FROM a LEFT JOIN b ON a.x = b.x WHERE b.x IS NULL"
        ),
        vec![Value::String("one".into())]
    );
    assert_eq!(
        column(
            &mut s,
            "SELECT x FROM a WHERE x IN (SELECT x FROM b) AND x < ALL (SELECT x FROM b WHERE x > 2)"
        ),
        ints(&[2])
    );
}
