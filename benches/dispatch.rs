//! Benchmarks for inbound message fan-out and page processing.

use std::rc::Rc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hx_signalr::binding::AFTER_PROCESS_NODE;
use hx_signalr::connection::HubNetwork;
use hx_signalr::demo::Demo;
use hx_signalr::{Config, Document, Engine, Host};
use serde_json::json;

/// A page with one connection owner and `subscribers` subscribers to `tick`.
fn page(subscribers: usize) -> String {
    let mut html = String::from(r#"<div hx-ext="signalr" signalr-connect="/bench">"#);
    for i in 0..subscribers {
        html.push_str(&format!(
            r##"<div signalr-subscribe="tick" hx-target="#out-{i}"></div><div id="out-{i}"></div>"##
        ));
    }
    html.push_str("</div>");
    html
}

/// Process a page against a fresh network and return it ready for broadcasts.
fn setup(subscribers: usize) -> (Rc<Document>, Engine, Rc<HubNetwork>) {
    let network = HubNetwork::new();
    network.map_hub("/bench");
    let config = Config {
        default_settle_delay: 0,
        ..Config::default()
    };
    let doc = Rc::new(Document::from_html_with_config(&page(subscribers), config.clone()));
    let host: Rc<dyn Host> = doc.clone();
    let engine = Engine::with_network(host, config, network.clone());
    engine.listen(&doc);
    doc.dispatch(doc.body(), AFTER_PROCESS_NODE);
    network.run_until_idle();
    (doc, engine, network)
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for subscribers in [1usize, 10, 100] {
        let (doc, _engine, network) = setup(subscribers);
        let hub = network.hub("/bench").expect("hub is mapped");
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                let mut n = 0u64;
                b.iter(|| {
                    n += 1;
                    hub.broadcast("tick", json!(format!("<span>{}</span>", n)));
                    network.run_until_idle();
                    doc.run_pending_timers();
                    black_box(&doc);
                })
            },
        );
    }
    group.finish();
}

fn bench_process_page(c: &mut Criterion) {
    c.bench_function("process_page_50", |b| {
        b.iter(|| black_box(setup(50)));
    });
}

fn bench_demo_tick(c: &mut Criterion) {
    let demo = Demo::with_values(Config::default(), || 1);
    let mut value = 0u32;
    c.bench_function("demo_tick", |b| {
        b.iter(|| {
            value = value.wrapping_add(1);
            demo.tick(black_box(value));
        })
    });
}

criterion_group!(benches, bench_fan_out, bench_process_page, bench_demo_tick);
criterion_main!(benches);
