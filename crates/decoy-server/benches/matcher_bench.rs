use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use decoy_server::history::Request;
use decoy_server::matcher::{AssertionRegistry, MultiMap};
use decoy_server::store::{InMemoryStore, MockStore};
use decoy_server::{Mock, MockDefinition};
use serde_json::json;

fn create_mock(id: usize, regex: bool) -> Mock {
    let path = if regex {
        format!("{{matcher: ShouldMatch, value: '^/api/v\\d+/endpoint{id}$'}}")
    } else {
        format!("/api/v1/endpoint{id}")
    };
    let yaml = format!(
        "request:\n  method: GET\n  path: {path}\n  headers:\n    Accept: application/json\nresponse:\n  status: 200"
    );
    serde_yaml::from_str::<MockDefinition>(&yaml)
        .unwrap()
        .validate(&AssertionRegistry::standard())
        .unwrap()
}

fn create_store(count: usize, regex: bool) -> (InMemoryStore, String) {
    let store = InMemoryStore::default();
    let session = store.last_session_id();
    for i in 0..count {
        store.add_mock(&session, create_mock(i, regex)).unwrap();
    }
    (store, session)
}

fn request(path: &str) -> Request {
    let mut headers = MultiMap::new();
    headers.insert("Accept".to_string(), vec!["application/json".to_string()]);
    Request {
        path: path.to_string(),
        method: "GET".to_string(),
        headers,
        ..Request::default()
    }
}

/// First match in a snapshot, the way the dispatcher scans it.
fn find_match<'a>(mocks: &'a [Mock], request: &Request) -> Option<&'a Mock> {
    mocks.iter().find(|m| m.matches(request))
}

fn bench_mock_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("mock_matching");

    for mock_count in [10, 100, 1000].iter() {
        for regex in [false, true] {
            let (store, session) = create_store(*mock_count, regex);
            let mocks = store.get_mocks(&session).unwrap();
            let kind = if regex { "regex" } else { "exact" };

            // Newest mock is evaluated first.
            let best = request(&format!("/api/v1/endpoint{}", mock_count - 1));
            let worst = request("/api/v1/endpoint0");
            let miss = request("/nowhere");

            group.throughput(Throughput::Elements(1));
            for (case, req) in [("best", &best), ("worst", &worst), ("miss", &miss)] {
                group.bench_with_input(
                    BenchmarkId::new(format!("{kind}_{case}"), mock_count),
                    mock_count,
                    |b, _| b.iter(|| find_match(black_box(&mocks), black_box(req))),
                );
            }
        }
    }

    group.finish();
}

fn bench_body_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("body_matching");

    let yaml = r#"
request:
  method: POST
  body:
    order.items.0.sku: ABC-1
    order.customer:
      matcher: ShouldMatch
      value: "^c-[0-9]+$"
response:
  status: 200
"#;
    let mock = serde_yaml::from_str::<MockDefinition>(yaml)
        .unwrap()
        .validate(&AssertionRegistry::standard())
        .unwrap();

    let body = json!({
        "order": {
            "customer": "c-42",
            "items": [{"sku": "ABC-1", "qty": 2}, {"sku": "XYZ-9", "qty": 1}]
        }
    });
    let request = Request {
        method: "POST".to_string(),
        path: "/orders".to_string(),
        body_string: body.to_string(),
        body,
        ..Request::default()
    };

    group.bench_function("json_paths", |b| {
        b.iter(|| black_box(&mock).matches(black_box(&request)))
    });

    group.finish();
}

fn bench_store_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_snapshot");

    for mock_count in [10, 100, 1000].iter() {
        let (store, session) = create_store(*mock_count, false);
        group.bench_with_input(
            BenchmarkId::new("get_mocks", mock_count),
            mock_count,
            |b, _| b.iter(|| store.get_mocks(black_box(&session)).unwrap()),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_mock_matching,
    bench_body_matching,
    bench_store_snapshot
);
criterion_main!(benches);
