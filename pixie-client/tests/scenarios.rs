//! End-to-end scenarios driving a [`Script`] against a scripted
//! [`FakeDataPlane`], exercising the full client stack through its public
//! surface: connection, subscription, execution, and error reporting.

use std::sync::{Arc, Mutex};

use pixie_client::testing::{FakeControlPlane, FakeControlPlaneFactory, FakeDataPlane, FakeDataPlaneFactory};
use pixie_client::{
    ApiError, ClusterStatus, Column, ColumnType, Conn, Data, MetaData, RawClusterInfo, Response,
    RowBatch, Status, TypedColumn,
};
use uuid::Uuid;

fn http_metadata(table_id: Uuid) -> Response {
    Response::MetaData(MetaData {
        table_id,
        name: "http".to_string(),
        relation: vec![
            Column {
                name: "http_resp_body".to_string(),
                ty: ColumnType::String,
            },
            Column {
                name: "http_resp_status".to_string(),
                ty: ColumnType::Int64,
            },
        ],
    })
}

fn http_batch(table_id: Uuid, bodies: &[&str], statuses: &[i64], eos: bool) -> Response {
    Response::Data(Data {
        batch: Some(RowBatch {
            table_id,
            columns: vec![
                TypedColumn::String(bodies.iter().map(|s| s.to_string()).collect()),
                TypedColumn::Int64(statuses.to_vec()),
            ],
            num_rows: bodies.len(),
            eos,
        }),
    })
}

fn stats_metadata(table_id: Uuid) -> Response {
    Response::MetaData(MetaData {
        table_id,
        name: "stats".to_string(),
        relation: vec![
            Column {
                name: "upid".to_string(),
                ty: ColumnType::Uint128,
            },
            Column {
                name: "cpu_ktime_ns".to_string(),
                ty: ColumnType::Int64,
            },
            Column {
                name: "rss_bytes".to_string(),
                ty: ColumnType::Int64,
            },
        ],
    })
}

fn stats_batch(table_id: Uuid, upid: (u64, u64), cpu: i64, rss: i64, eos: bool) -> Response {
    Response::Data(Data {
        batch: Some(RowBatch {
            table_id,
            columns: vec![
                TypedColumn::Uint128(vec![upid]),
                TypedColumn::Int64(vec![cpu]),
                TypedColumn::Int64(vec![rss]),
            ],
            num_rows: 1,
            eos,
        }),
    })
}

fn stats_eos(table_id: Uuid) -> Response {
    Response::Data(Data {
        batch: Some(RowBatch {
            table_id,
            columns: vec![
                TypedColumn::Uint128(vec![]),
                TypedColumn::Int64(vec![]),
                TypedColumn::Int64(vec![]),
            ],
            num_rows: 0,
            eos: true,
        }),
    })
}

/// Connects a `Conn` backed by a fake control plane (one healthy,
/// passthrough-enabled cluster) and a fake data plane scripted with
/// `responses`.
fn connect(responses: Vec<Result<Response, ApiError>>) -> Conn {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let cluster_id = Uuid::from_u128(1);
        let control = FakeControlPlane::new().with_cluster(RawClusterInfo {
            id: cluster_id,
            name: "test-cluster".to_string(),
            status: ClusterStatus::Healthy,
            passthrough_enabled: true,
        });
        let client = pixie_client::Client::new(
            "token",
            "https://vizier.example",
            Arc::new(FakeControlPlaneFactory::new(control)),
            Arc::new(FakeDataPlaneFactory::new(FakeDataPlane::new(responses))),
        )
        .await
        .unwrap();
        let clusters = client.list_healthy_clusters().await.unwrap();
        client.connect_to_cluster(&clusters[0]).await.unwrap()
    })
}

#[test]
fn scenario_1_one_table_one_row_via_callback() {
    let t1 = Uuid::from_u128(100);
    let conn = connect(vec![
        Ok(http_metadata(t1)),
        Ok(http_batch(t1, &["foo"], &[200], false)),
        Ok(http_batch(t1, &[], &[], true)),
    ]);

    let mut script = conn.script("df.stream('http')");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    script
        .add_callback(
            "http",
            Box::new(move |row| {
                seen2.lock().unwrap().push((
                    row["http_resp_body"].as_str().unwrap().to_string(),
                    row["http_resp_status"].as_i64().unwrap(),
                ));
                Ok(())
            }),
        )
        .unwrap();

    script.run().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![("foo".to_string(), 200)]);
}

#[test]
fn scenario_2_split_row_batches_preserve_order() {
    let t1 = Uuid::from_u128(101);
    let conn = connect(vec![
        Ok(http_metadata(t1)),
        Ok(http_batch(t1, &["foo", "bar", "baz"], &[200, 500, 301], false)),
        Ok(http_batch(t1, &["bat"], &[404], false)),
        Ok(http_batch(t1, &[], &[], true)),
    ]);

    let script = conn.script("df.stream('http')");
    let rows: Vec<_> = script
        .results("http")
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    let got: Vec<(String, i64)> = rows
        .iter()
        .map(|r| (r["http_resp_body"].as_str().unwrap().to_string(), r["http_resp_status"].as_i64().unwrap()))
        .collect();
    assert_eq!(
        got,
        vec![
            ("foo".to_string(), 200),
            ("bar".to_string(), 500),
            ("baz".to_string(), 301),
            ("bat".to_string(), 404),
        ]
    );
}

#[test]
fn scenario_3_two_tables_interleaved() {
    let t_http = Uuid::from_u128(102);
    let t_stats = Uuid::from_u128(103);
    let conn = connect(vec![
        Ok(http_metadata(t_http)),
        Ok(http_batch(t_http, &["foo"], &[200], false)),
        Ok(stats_metadata(t_stats)),
        Ok(stats_batch(t_stats, (123, 456), 1000, 999, false)),
        Ok(http_batch(t_http, &[], &[], true)),
        Ok(stats_eos(t_stats)),
    ]);

    let mut script = conn.script("df.stream('http'); df.stream('stats')");
    let http_rows = Arc::new(Mutex::new(Vec::new()));
    let stats_rows = Arc::new(Mutex::new(Vec::new()));
    let http2 = http_rows.clone();
    let stats2 = stats_rows.clone();
    script
        .add_callback("http", Box::new(move |row| {
            http2.lock().unwrap().push(row["http_resp_body"].as_str().unwrap().to_string());
            Ok(())
        }))
        .unwrap();
    script
        .add_callback("stats", Box::new(move |row| {
            stats2.lock().unwrap().push(row["upid"].as_uuid().unwrap().to_string());
            Ok(())
        }))
        .unwrap();

    script.run().unwrap();
    assert_eq!(*http_rows.lock().unwrap(), vec!["foo".to_string()]);
    assert_eq!(
        *stats_rows.lock().unwrap(),
        vec!["00000000-0000-007b-0000-0000000001c8".to_string()]
    );
}

#[test]
fn scenario_4_compile_error() {
    let conn = connect(vec![Ok(Response::Status(Status {
        code: 3,
        message: "name 'aa' is not defined".to_string(),
        compiler_errors: vec![pixie_client::CompilerError {
            line: 1,
            column: 2,
            message: "name 'aa' is not defined".to_string(),
        }],
    }))]);

    let script = conn.script("aa");
    let err = script.run().unwrap_err();
    match err {
        ApiError::ScriptCompileError { line, message, .. } => {
            assert_eq!(line, 1);
            assert!(message.contains("name 'aa' is not defined"));
        }
        other => panic!("expected ScriptCompileError, got {other:?}"),
    }
}

#[test]
fn scenario_5_mid_stream_server_error() {
    let t1 = Uuid::from_u128(104);
    let conn = connect(vec![
        Ok(http_metadata(t1)),
        Ok(http_batch(t1, &["foo"], &[200], false)),
        Ok(Response::Status(Status {
            code: 3,
            message: "server error".to_string(),
            compiler_errors: vec![],
        })),
    ]);

    let mut script = conn.script("df.stream('http')");
    script.add_callback("http", Box::new(|_row| Ok(()))).unwrap();
    let err = script.run().unwrap_err();
    match err {
        ApiError::ScriptValueError(msg) => assert_eq!(msg, "server error"),
        other => panic!("expected ScriptValueError, got {other:?}"),
    }
}

#[test]
fn scenario_6_truncated_stream() {
    let t1 = Uuid::from_u128(105);
    let conn = connect(vec![Ok(http_metadata(t1)), Ok(http_batch(t1, &["foo"], &[200], false))]);

    let mut script = conn.script("df.stream('http')");
    script.add_callback("http", Box::new(|_row| Ok(()))).unwrap();
    let err = script.run().unwrap_err();
    assert!(matches!(err, ApiError::UnexpectedEndOfStream));
}

#[test]
fn scenario_7_subscription_to_missing_table() {
    let t1 = Uuid::from_u128(106);
    let conn = connect(vec![
        Ok(http_metadata(t1)),
        Ok(http_batch(t1, &["foo"], &[200], true)),
    ]);

    let mut script = conn.script("df.stream('foobar')");
    script.add_callback("foobar", Box::new(|_row| Ok(()))).unwrap();
    let err = script.run().unwrap_err();
    match err {
        ApiError::TableNotReceived { table } => assert_eq!(table, "foobar"),
        other => panic!("expected TableNotReceived, got {other:?}"),
    }
}

#[test]
fn scenario_8_callback_exception_stops_other_tables() {
    let t_http = Uuid::from_u128(107);
    let t_stats = Uuid::from_u128(108);
    let conn = connect(vec![
        Ok(http_metadata(t_http)),
        Ok(http_batch(t_http, &["foo"], &[200], false)),
        Ok(stats_metadata(t_stats)),
        Ok(http_batch(t_http, &[], &[], true)),
        Ok(stats_batch(t_stats, (1, 1), 1, 1, true)),
    ]);

    let mut script = conn.script("df.stream('http'); df.stream('stats')");
    script
        .add_callback(
            "http",
            Box::new(|_row| Err("random internal error".into())),
        )
        .unwrap();
    let stats_rows = Arc::new(Mutex::new(Vec::new()));
    let stats2 = stats_rows.clone();
    script
        .add_callback("stats", Box::new(move |row| {
            stats2.lock().unwrap().push(row.values().len());
            Ok(())
        }))
        .unwrap();

    let err = script.run().unwrap_err();
    assert!(matches!(err, ApiError::CallbackError(_)));
    assert!(stats_rows.lock().unwrap().is_empty());
}

#[test]
fn scenario_9_duplicate_table_id_is_a_protocol_error() {
    let t1 = Uuid::from_u128(109);
    let conn = connect(vec![Ok(http_metadata(t1)), Ok(http_metadata(t1))]);

    let mut script = conn.script("df.stream('http')");
    script.add_callback("http", Box::new(|_row| Ok(()))).unwrap();
    let err = script.run().unwrap_err();
    assert!(matches!(err, ApiError::ProtocolError(_)));
}

#[test]
fn scenario_10_subscribe_all_tables_preserves_metadata_arrival_order() {
    let t_stats = Uuid::from_u128(110);
    let t_http = Uuid::from_u128(111);
    let conn = connect(vec![
        Ok(stats_metadata(t_stats)),
        Ok(http_metadata(t_http)),
        Ok(stats_batch(t_stats, (1, 1), 1, 1, true)),
        Ok(http_batch(t_http, &["foo"], &[200], true)),
    ]);

    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut script = conn.script("df.stream_all()");
    let mut generator = script.subscribe_all_tables().unwrap();

    let names = Arc::new(Mutex::new(Vec::new()));
    let names2 = names.clone();
    let handle = std::thread::spawn(move || {
        rt.block_on(async move {
            while let Some(sub) = generator.next().await {
                names2.lock().unwrap().push(sub.table_name().to_string());
            }
        });
    });

    script.run().unwrap();
    handle.join().unwrap();
    assert_eq!(*names.lock().unwrap(), vec!["stats".to_string(), "http".to_string()]);
}

#[test]
fn scenario_11_direct_subscribe_takes_precedence_over_subscribe_all() {
    let t_stats = Uuid::from_u128(113);
    let t_http = Uuid::from_u128(114);
    let conn = connect(vec![
        Ok(stats_metadata(t_stats)),
        Ok(http_metadata(t_http)),
        Ok(stats_batch(t_stats, (1, 1), 1, 1, true)),
        Ok(http_batch(t_http, &["foo"], &[200], true)),
    ]);

    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut script = conn.script("df.stream_all()");
    let mut generator = script.subscribe_all_tables().unwrap();

    // A name claimed directly, even after subscribe_all_tables(), is served
    // by that direct subscription instead of the generator.
    let http_rows = Arc::new(Mutex::new(Vec::new()));
    let http2 = http_rows.clone();
    script
        .add_callback(
            "http",
            Box::new(move |row| {
                http2.lock().unwrap().push(row["http_resp_body"].as_str().unwrap().to_string());
                Ok(())
            }),
        )
        .unwrap();

    let names = Arc::new(Mutex::new(Vec::new()));
    let names2 = names.clone();
    let handle = std::thread::spawn(move || {
        rt.block_on(async move {
            while let Some(sub) = generator.next().await {
                names2.lock().unwrap().push(sub.table_name().to_string());
            }
        });
    });

    script.run().unwrap();
    handle.join().unwrap();
    assert_eq!(*names.lock().unwrap(), vec!["stats".to_string()]);
    assert_eq!(*http_rows.lock().unwrap(), vec!["foo".to_string()]);
}

#[test]
fn scenario_12_transport_error_outranks_table_not_received() {
    let t1 = Uuid::from_u128(112);
    let conn = connect(vec![
        Ok(http_metadata(t1)),
        Err(ApiError::transport(std::io::Error::other("connection reset"))),
    ]);

    let mut script = conn.script("df.stream('http'); df.stream('foobar')");
    script.add_callback("http", Box::new(|_row| Ok(()))).unwrap();
    script.add_callback("foobar", Box::new(|_row| Ok(()))).unwrap();
    let err = script.run().unwrap_err();
    assert!(matches!(err, ApiError::TransportError(_)));
}
