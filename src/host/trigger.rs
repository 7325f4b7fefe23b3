//! Trigger specifications (`hx-trigger`).

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    pub event: String,
    pub once: bool,
}

impl TriggerSpec {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            once: false,
        }
    }
}

/// Parse `"click, keyup once"` into trigger specs.
pub fn parse_trigger_specs(value: &str) -> Vec<TriggerSpec> {
    value
        .split(',')
        .filter_map(|part| {
            let mut tokens = part.split_whitespace();
            let mut spec = TriggerSpec::new(tokens.next()?);
            for modifier in tokens {
                match modifier {
                    "once" => spec.once = true,
                    other => tracing::debug!(modifier = other, "ignoring trigger modifier"),
                }
            }
            Some(spec)
        })
        .collect()
}

/// The trigger an element fires on when it declares none.
pub fn default_trigger(tag: &str) -> TriggerSpec {
    match tag {
        "form" => TriggerSpec::new("submit"),
        "input" | "select" | "textarea" => TriggerSpec::new("change"),
        _ => TriggerSpec::new("click"),
    }
}
