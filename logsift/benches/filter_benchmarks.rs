#![allow(unused_must_use)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use logsift::{
    sift, Cancellation, Formatter, LineParser, LogFormat, Matcher, OutputFormat, QueryParser,
    RecordParser, RecordPool, SiftConfig, Writer,
};
use std::{fs::File, io::Write, num::NonZeroUsize, path::PathBuf, sync::Arc};
use tempfile::tempdir;

fn create_log_file(dir: &tempfile::TempDir, lines: usize) -> std::io::Result<PathBuf> {
    let path = dir.path().join("bench.log");
    let mut file = File::create(&path)?;
    for i in 0..lines {
        let level = match i % 10 {
            0 => "error",
            1 | 2 => "warn",
            _ => "info",
        };
        writeln!(
            file,
            r#"{{"timestamp":"2024-01-15T10:{:02}:{:02}Z","level":"{}","status":{},"user":{{"id":{},"role":"admin"}},"message":"request {} handled"}}"#,
            (i / 60) % 60,
            i % 60,
            level,
            200 + (i % 4) * 100,
            i % 97,
            i
        )?;
    }
    Ok(path)
}

fn bench_query_parsing(c: &mut Criterion) {
    let queries = [
        "level:error",
        "level:error,status>=500",
        "level:error|level:warn|status>=500",
        r#"message~=^request \d+ handled$,user.role:admin"#,
    ];

    let parser = QueryParser::new();
    let mut group = c.benchmark_group("Query Parsing");
    for (i, query) in queries.iter().enumerate() {
        group.bench_function(format!("query_{}", i), |b| {
            b.iter(|| black_box(parser.parse(black_box(query)).unwrap()));
        });
    }
    group.finish();
}

fn bench_matching(c: &mut Criterion) {
    let pool = Arc::new(RecordPool::new());
    let parser = LineParser::new(LogFormat::Auto, pool);
    let json = parser
        .parse(
            r#"{"level":"error","status":503,"user":{"id":7},"message":"upstream timeout"}"#,
            1,
        )
        .unwrap();
    let kv = parser
        .parse(r#"level=error status=503 message="upstream timeout""#, 2)
        .unwrap();

    let queries = [
        ("equality", "level:error"),
        ("numeric", "status>=500"),
        ("nested", "user.id:7"),
        ("regex", "message~=time.*out"),
        ("or_chain", "level:debug|level:info|level:error"),
    ];

    let mut group = c.benchmark_group("Matching");
    for (name, query) in queries {
        let tree = QueryParser::new().parse(query).unwrap();
        let matcher = Matcher::new(false);
        group.bench_function(format!("json_{}", name), |b| {
            b.iter(|| black_box(matcher.matches(&json, Some(&tree))));
        });
        group.bench_function(format!("kv_{}", name), |b| {
            b.iter(|| black_box(matcher.matches(&kv, Some(&tree))));
        });
    }
    group.finish();
}

fn bench_parsing(c: &mut Criterion) {
    let pool = Arc::new(RecordPool::new());
    let json = r#"{"timestamp":"2024-01-15T10:00:01Z","level":"error","status":500,"user":{"id":1,"profile":{"role":"admin"}}}"#;
    let kv = r#"timestamp=2024-01-15T10:00:01Z level=error status=500 message="Connection failed""#;

    let mut group = c.benchmark_group("Line Parsing");
    for (name, format, line) in [
        ("json", LogFormat::Json, json),
        ("keyvalue", LogFormat::KeyValue, kv),
        ("auto_json", LogFormat::Auto, json),
        ("auto_keyvalue", LogFormat::Auto, kv),
    ] {
        let parser = LineParser::new(format, pool.clone());
        group.bench_function(name, |b| {
            b.iter(|| {
                let record = parser.parse(black_box(line), 1).unwrap();
                pool.release(record);
            });
        });
    }
    group.finish();
}

fn bench_worker_scaling(c: &mut Criterion) -> std::io::Result<()> {
    let dir = tempdir()?;
    let path = create_log_file(&dir, 20_000)?;

    let mut group = c.benchmark_group("Worker Scaling");
    group.sample_size(10);
    for jobs in [1, 2, 4, 8] {
        for chunk_size in [0, 1000] {
            let config = SiftConfig {
                query: "level:error,status>=500".to_string(),
                files: vec![path.clone()],
                jobs: NonZeroUsize::new(jobs).unwrap(),
                chunk_size,
                count_only: true,
                ..SiftConfig::default()
            };

            group.bench_function(format!("jobs_{}_chunk_{}", jobs, chunk_size), |b| {
                b.iter(|| {
                    let mut writer =
                        Writer::new(std::io::sink(), Formatter::new(OutputFormat::Raw))
                            .count_only(true);
                    black_box(sift(&config, &Cancellation::new(), &mut writer).unwrap())
                });
            });
        }
    }
    group.finish();
    Ok(())
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_query_parsing, bench_matching, bench_parsing, bench_worker_scaling
}

#[test]
fn ensure_benchmarks_valid() {
    benches();
}

criterion_main!(benches);
