//! Demonstration page and hub, wired to the engine and driven on a timer.

pub mod hub;
pub mod templates;

use std::rc::Rc;
use std::time::Duration;

use colored::Colorize;
use rand::Rng;
use serde::Serialize;

use crate::binding::{Engine, AFTER_PROCESS_NODE};
use crate::config::Config;
use crate::connection::{Hub, HubNetwork};
use crate::dom::Document;
use crate::error::SignalrError;
use crate::host::Host;
pub use hub::{broadcast_tick, echo_markup, map_test_hub, TEST_HUB_ADDRESS};
pub use templates::MustacheTemplates;

/// Shortest pause between broadcasts.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Body of the demonstration page.
pub const DEMO_PAGE: &str = r##"<div hx-ext="signalr,client-side-templates" signalr-connect="/testhub">
    <div signalr-subscribe="counter">
        <div id="counter"></div>
    </div>
    <form signalr-send="echo">
        <input type="text" name="message">
        <button type="submit">Submit</button>
    </form>
    <div signalr-subscribe="echo" hx-target="#echo-target" hx-swap="beforeend">
    </div>
    <h2>Echo target is below</h2>
    <div id="echo-target"></div>
    <h2>Echo oob data is below</h2>
    <div id="echo-oob-data"></div>
    <hr>
    <h2>Transform response test (Mustache client side templates)</h2>
    <div mustache-template="foo" signalr-subscribe="json">
    </div>
    <template id="foo">
        <div id="json">{{name}} - {{id}} </div>
    </template>
</div>"##;

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub ticks: u32,
    pub interval: Duration,
    pub echo: Option<String>,
    pub config: Config,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            ticks: 3,
            interval: Duration::from_millis(5000),
            echo: None,
            config: Config::default(),
        }
    }
}

/// Text content of the elements the demo page updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub counter: String,
    pub echo: Vec<String>,
    pub echo_oob_data: String,
    pub json: String,
}

/// The demo page, its engine and the hub it talks to.
pub struct Demo {
    doc: Rc<Document>,
    engine: Engine,
    network: Rc<HubNetwork>,
    hub: Rc<Hub>,
}

impl Demo {
    pub fn new(config: Config) -> Self {
        Self::with_values(config, || rand::thread_rng().gen_range(0..i32::MAX as u32))
    }

    /// Build the demo with a custom source for the values the hub sends.
    pub fn with_values(config: Config, next_value: impl Fn() -> u32 + 'static) -> Self {
        let network = HubNetwork::new();
        let hub = map_test_hub(&network, next_value);
        let doc = Rc::new(Document::from_html_with_config(DEMO_PAGE, config.clone()));
        let host: Rc<dyn Host> = doc.clone();
        let engine = Engine::with_network(host, config, network.clone());
        engine.add_response_transform(MustacheTemplates);
        engine.listen(&doc);
        doc.dispatch(doc.body(), AFTER_PROCESS_NODE);
        let demo = Self {
            doc,
            engine,
            network,
            hub,
        };
        demo.settle();
        demo
    }

    pub fn document(&self) -> &Rc<Document> {
        &self.doc
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn hub(&self) -> &Rc<Hub> {
        &self.hub
    }

    /// Deliver every in-flight message and run every pending settle timer.
    pub fn settle(&self) {
        while self.network.run_until_idle() > 0 || self.doc.pending_timers() > 0 {
            self.doc.run_pending_timers();
        }
    }

    pub fn tick(&self, value: u32) {
        broadcast_tick(&self.hub, value);
        self.settle();
    }

    /// Type `message` into the echo form and submit it.
    pub fn echo(&self, message: &str) -> Result<(), SignalrError> {
        let form = self
            .doc
            .query_selector(self.doc.root(), "form")
            .ok_or_else(|| SignalrError::config("demo page has no form"))?;
        let input = self
            .doc
            .query_selector(form, "input[name=message]")
            .ok_or_else(|| SignalrError::config("demo form has no message input"))?;
        self.doc.set_attribute(input, "value", message);
        self.doc.dispatch(form, "submit");
        self.settle();
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        let text = |id: &str| {
            self.doc
                .get_element_by_id(id)
                .map(|n| self.doc.text_content(n).trim().to_string())
                .unwrap_or_default()
        };
        let echo = self
            .doc
            .get_element_by_id("echo-target")
            .map(|target| {
                self.doc
                    .element_children(target)
                    .into_iter()
                    .map(|n| self.doc.text_content(n))
                    .collect()
            })
            .unwrap_or_default();
        Snapshot {
            counter: text("counter"),
            echo,
            echo_oob_data: text("echo-oob-data"),
            json: text("json"),
        }
    }
}

fn print_snapshot(label: &str, snapshot: &Snapshot) {
    println!("{}", label.bold());
    println!("  {} {}", "counter:".cyan(), snapshot.counter);
    println!("  {} {}", "json:".cyan(), snapshot.json);
    println!("  {} {:?}", "echo:".cyan(), snapshot.echo);
    println!("  {} {}", "echo-oob-data:".cyan(), snapshot.echo_oob_data);
}

/// Run the demo: broadcast `ticks` rounds `interval` apart, then optionally
/// submit one echo.
pub async fn run(options: DemoOptions) -> Result<Snapshot, SignalrError> {
    let demo = Demo::new(options.config);
    let hub = demo.hub().clone();
    tracing::info!(
        address = TEST_HUB_ADDRESS,
        clients = hub.client_count(),
        "demo page connected"
    );

    // A zero period panics in tokio.
    let mut interval = tokio::time::interval(options.interval.max(MIN_INTERVAL));
    for tick in 1..=options.ticks {
        interval.tick().await;
        demo.tick(rand::thread_rng().gen_range(0..i32::MAX as u32));
        print_snapshot(&format!("tick {}", tick), &demo.snapshot());
    }

    if let Some(message) = options.echo.as_deref() {
        demo.echo(message)?;
        print_snapshot("echo", &demo.snapshot());
    }

    println!("{}", "page".bold());
    println!("{}", demo.document().inner_html(demo.document().body()).dimmed());
    Ok(demo.snapshot())
}
