//! Script execution for loaded pages.
//!
//! [`ScriptEngine`] keeps one JavaScript realm alive for the lifetime of a page.
//! Scripts see a DOM mirror that the host refreshes with [`ScriptEngine::sync_elements`];
//! every edit they make is recorded and handed back through
//! [`ScriptEngine::drain_mutations`] so the host can replay it onto its own document.
//! Timers run on a virtual clock the host advances explicitly.

mod mutation;
mod snapshot;

pub use mutation::DomMutation;
pub use mutation::NodeRef;
pub use snapshot::DomSnapshot;
pub use snapshot::KeyAlias;
pub use snapshot::NodeSnapshot;
pub use snapshot::SnapshotChild;

use boa_engine::Context;
use boa_engine::Source;
use serde::Deserialize;
use serde::Serialize;
use sl_core::LoaderError;
use sl_core::LoaderResult;
use std::fmt;
use tracing::debug;
use tracing::warn;

const BOOTSTRAP: &str = include_str!("bootstrap.js");

/// Script payload to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    pub origin: String,
    pub source: String,
}

impl ScriptSource {
    pub fn new(origin: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            source: source.into(),
        }
    }
}

/// Page facts exposed to scripts through `location` and `navigator`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsHostEnvironment {
    pub page_url: String,
    pub user_agent: String,
}

/// Runtime hardening knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsRuntimeConfig {
    /// Scripts larger than this are not evaluated.
    pub max_script_bytes: usize,
    pub recursion_limit: usize,
    pub stack_size_limit: usize,
    pub loop_iteration_limit: u64,
    /// Upper bound on timer callbacks run by one [`ScriptEngine::run_due_timers`] call.
    pub max_timer_runs: usize,
    pub frame_interval_ms: u64,
    pub max_console_messages: usize,
}

impl Default for JsRuntimeConfig {
    fn default() -> Self {
        Self {
            max_script_bytes: 8 * 1024 * 1024,
            recursion_limit: 512,
            stack_size_limit: 10 * 1024,
            loop_iteration_limit: 1_000_000,
            max_timer_runs: 1_000,
            frame_interval_ms: 16,
            max_console_messages: 500,
        }
    }
}

/// Per-script execution error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub origin: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    Completed,
    /// The script threw; execution of later scripts is unaffected.
    Threw(ScriptError),
    Skipped { bytes: usize },
}

impl ScriptOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptStats {
    pub executed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub timer_runs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Interactive => "interactive",
            Self::Complete => "complete",
        }
    }
}

/// Truthiness of a global as seen by script code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalFlag {
    Undefined,
    True,
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsoleMessage {
    pub level: ConsoleLevel,
    pub text: String,
}

impl ConsoleMessage {
    /// Forwards the message to the `sl_js::console` tracing target.
    pub fn emit(&self) {
        match self.level {
            ConsoleLevel::Error => tracing::error!(target: "sl_js::console", "{}", self.text),
            ConsoleLevel::Warn => tracing::warn!(target: "sl_js::console", "{}", self.text),
            ConsoleLevel::Info | ConsoleLevel::Log => {
                tracing::info!(target: "sl_js::console", "{}", self.text)
            }
            ConsoleLevel::Debug => tracing::debug!(target: "sl_js::console", "{}", self.text),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HostSeed<'a> {
    page_url: &'a str,
    user_agent: &'a str,
    frame_interval: u64,
    max_console: usize,
}

/// A live JavaScript realm bound to one page.
pub struct ScriptEngine {
    context: Context,
    config: JsRuntimeConfig,
    stats: ScriptStats,
}

impl fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl ScriptEngine {
    pub fn new(config: JsRuntimeConfig, host: &JsHostEnvironment) -> LoaderResult<Self> {
        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_recursion_limit(config.recursion_limit);
        context
            .runtime_limits_mut()
            .set_stack_size_limit(config.stack_size_limit);
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(config.loop_iteration_limit);

        let seed = serde_json::to_string(&HostSeed {
            page_url: &host.page_url,
            user_agent: &host.user_agent,
            frame_interval: config.frame_interval_ms.max(1),
            max_console: config.max_console_messages,
        })
        .map_err(|error| {
            LoaderError::new("js.bootstrap.encode", format!("failed to encode host seed: {error}"))
        })?;

        let mut engine = Self {
            context,
            config,
            stats: ScriptStats::default(),
        };
        let install_failed = |error: LoaderError| {
            LoaderError::new(
                "js.bootstrap.failed",
                format!("failed to install page environment: {error}"),
            )
        };
        engine
            .eval_host(&format!("globalThis.__slHost = {seed}; 0"))
            .map_err(install_failed)?;
        engine.eval_host(BOOTSTRAP).map_err(install_failed)?;
        Ok(engine)
    }

    pub fn config(&self) -> &JsRuntimeConfig {
        &self.config
    }

    pub fn stats(&self) -> ScriptStats {
        self.stats
    }

    /// Evaluates one script. Exceptions are reported in the outcome, never raised.
    pub fn execute(&mut self, script: &ScriptSource) -> ScriptOutcome {
        let bytes = script.source.len();
        if bytes > self.config.max_script_bytes {
            self.stats.skipped = self.stats.skipped.saturating_add(1);
            warn!(
                origin = %script.origin,
                bytes,
                limit = self.config.max_script_bytes,
                "skipping oversized script"
            );
            return ScriptOutcome::Skipped { bytes };
        }

        let result = self
            .context
            .eval(Source::from_bytes(script.source.as_bytes()));
        self.context.run_jobs();
        match result {
            Ok(_) => {
                self.stats.executed = self.stats.executed.saturating_add(1);
                debug!(origin = %script.origin, bytes, "script completed");
                ScriptOutcome::Completed
            }
            Err(error) => {
                self.stats.failed = self.stats.failed.saturating_add(1);
                let message = error.to_string();
                warn!(origin = %script.origin, %message, "script threw");
                ScriptOutcome::Threw(ScriptError {
                    origin: script.origin.clone(),
                    message,
                })
            }
        }
    }

    /// Advances the virtual clock to `now_ms` and runs every timer due by then.
    /// Returns how many callbacks ran.
    pub fn run_due_timers(&mut self, now_ms: u64) -> LoaderResult<usize> {
        let raw = self.eval_host(&format!(
            "__sl.runTimers({now_ms}, {})",
            self.config.max_timer_runs
        ))?;
        self.context.run_jobs();
        let runs = parse_number(&raw).map_or(0, |value| value as usize);
        self.stats.timer_runs = self.stats.timer_runs.saturating_add(runs);
        Ok(runs)
    }

    /// Virtual time at which the earliest pending timer fires.
    pub fn next_timer_due(&mut self) -> LoaderResult<Option<u64>> {
        let raw = self.eval_host("__sl.nextDue()")?;
        Ok(parse_number(&raw)
            .filter(|value| *value >= 0.0)
            .map(|value| value.ceil() as u64))
    }

    pub fn set_ready_state(&mut self, state: ReadyState) -> LoaderResult<()> {
        self.eval_host(&format!("__sl.setReadyState({})", js_string(state.as_str())))?;
        self.context.run_jobs();
        Ok(())
    }

    pub fn dispatch_document_event(&mut self, event_type: &str) -> LoaderResult<()> {
        self.fire("document", event_type)
    }

    pub fn dispatch_window_event(&mut self, event_type: &str) -> LoaderResult<()> {
        self.fire("window", event_type)
    }

    /// Event types dispatched on `window` or `document` since the last call,
    /// whether by the host or by script code.
    pub fn take_dispatched_events(&mut self) -> LoaderResult<Vec<String>> {
        self.take("dispatched")
    }

    pub fn global_flag(&mut self, name: &str) -> LoaderResult<GlobalFlag> {
        let raw = self.eval_host(&format!("__sl.flag({})", js_string(name)))?;
        Ok(match raw.as_str() {
            "true" => GlobalFlag::True,
            "false" => GlobalFlag::False,
            _ => GlobalFlag::Undefined,
        })
    }

    pub fn drain_mutations(&mut self) -> LoaderResult<Vec<DomMutation>> {
        self.take("mutations")
    }

    pub fn drain_console(&mut self) -> LoaderResult<Vec<ConsoleMessage>> {
        self.take("console")
    }

    /// Replaces the script-side DOM mirror. `aliases` re-key elements created by
    /// script to the nodes the host allocated for them, so existing references
    /// held by scripts stay valid.
    pub fn sync_elements(&mut self, snapshot: &DomSnapshot, aliases: &[KeyAlias]) -> LoaderResult<()> {
        let snapshot = encode("snapshot", snapshot)?;
        let aliases = encode("aliases", &aliases)?;
        self.eval_host(&format!(
            "__sl.sync({}, {})",
            js_string(&snapshot),
            js_string(&aliases)
        ))?;
        Ok(())
    }

    fn fire(&mut self, target: &str, event_type: &str) -> LoaderResult<()> {
        self.eval_host(&format!(
            "__sl.fire({}, {})",
            js_string(target),
            js_string(event_type)
        ))?;
        self.context.run_jobs();
        Ok(())
    }

    fn take<T: for<'de> Deserialize<'de>>(&mut self, field: &str) -> LoaderResult<Vec<T>> {
        let raw = self.eval_host(&format!("__sl.take({})", js_string(field)))?;
        serde_json::from_str(&raw).map_err(|error| {
            LoaderError::new(
                "js.host.decode_failed",
                format!("failed to decode `{field}` from page environment: {error}"),
            )
        })
    }

    fn eval_host(&mut self, code: &str) -> LoaderResult<String> {
        let value = self
            .context
            .eval(Source::from_bytes(code.as_bytes()))
            .map_err(|error| LoaderError::new("js.host.call_failed", error.to_string()))?;
        let text = value
            .to_string(&mut self.context)
            .map_err(|error| LoaderError::new("js.host.call_failed", error.to_string()))?;
        Ok(text.to_std_string_escaped())
    }
}

fn encode<T: Serialize + ?Sized>(what: &str, value: &T) -> LoaderResult<String> {
    serde_json::to_string(value).map_err(|error| {
        LoaderError::new("js.host.encode_failed", format!("failed to encode {what}: {error}"))
    })
}

/// JSON string literals are valid JavaScript string literals.
fn js_string(input: &str) -> String {
    serde_json::Value::String(input.to_owned()).to_string()
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::ConsoleLevel;
    use super::DomMutation;
    use super::DomSnapshot;
    use super::GlobalFlag;
    use super::JsHostEnvironment;
    use super::JsRuntimeConfig;
    use super::KeyAlias;
    use super::ReadyState;
    use super::ScriptEngine;
    use super::ScriptOutcome;
    use super::ScriptSource;
    use sl_core::LoaderResult;
    use sl_dom::Document;
    use sl_dom::NodeId;

    fn engine() -> ScriptEngine {
        let host = JsHostEnvironment {
            page_url: "https://app.example.test/dashboard?tab=1".to_owned(),
            user_agent: "shell-loader-test".to_owned(),
        };
        match ScriptEngine::new(JsRuntimeConfig::default(), &host) {
            Ok(engine) => engine,
            Err(error) => panic!("{error}"),
        }
    }

    fn ok<T>(result: LoaderResult<T>) -> T {
        match result {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    fn run(engine: &mut ScriptEngine, source: &str) {
        let outcome = engine.execute(&ScriptSource::new("inline:test", source));
        assert_eq!(outcome, ScriptOutcome::Completed);
    }

    fn page() -> (Document, NodeId) {
        let mut document = Document::new();
        let html = document.create_element("html");
        let head = document.create_element("head");
        let title = document.create_element("title");
        let title_text = document.create_text("Before");
        let body = document.create_element("body");
        let app = document.create_element_with_attrs(
            "div",
            vec![
                ("id".to_owned(), "app".to_owned()),
                ("class".to_owned(), "shell".to_owned()),
            ],
        );
        let text = document.create_text("hello");
        document.append_child(document.root(), html);
        document.append_child(html, head);
        document.append_child(head, title);
        document.append_child(title, title_text);
        document.append_child(html, body);
        document.append_child(body, app);
        document.append_child(app, text);
        (document, app)
    }

    #[test]
    fn exceptions_are_reported_and_later_scripts_still_run() {
        let mut engine = engine();
        let outcome = engine.execute(&ScriptSource::new("inline:1", "throw new Error('boom');"));
        match outcome {
            ScriptOutcome::Threw(error) => {
                assert_eq!(error.origin, "inline:1");
                assert!(!error.message.is_empty());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        run(&mut engine, "globalThis.afterFailure = true;");
        assert_eq!(ok(engine.global_flag("afterFailure")), GlobalFlag::True);
        assert_eq!(engine.stats().failed, 1);
        assert_eq!(engine.stats().executed, 1);
    }

    #[test]
    fn reads_tri_state_globals() {
        let mut engine = engine();
        assert_eq!(ok(engine.global_flag("holdProcessing")), GlobalFlag::Undefined);
        run(&mut engine, "globalThis.holdProcessing = 0;");
        assert_eq!(ok(engine.global_flag("holdProcessing")), GlobalFlag::False);
        run(&mut engine, "globalThis.holdProcessing = 'yes';");
        assert_eq!(ok(engine.global_flag("holdProcessing")), GlobalFlag::True);
    }

    #[test]
    fn timers_follow_the_virtual_clock() {
        let mut engine = engine();
        run(
            &mut engine,
            "globalThis.order = []; setTimeout(function () { order.push('late'); }, 100);\
             setTimeout(function () { order.push('early'); }, 10);\
             requestAnimationFrame(function (ts) { order.push('frame@' + ts); });",
        );
        assert_eq!(ok(engine.next_timer_due()), Some(10));
        assert_eq!(ok(engine.run_due_timers(16)), 2);
        assert_eq!(ok(engine.run_due_timers(99)), 0);
        assert_eq!(ok(engine.run_due_timers(100)), 1);
        assert_eq!(ok(engine.next_timer_due()), None);
        run(&mut engine, "document.title = order.join(',');");
        let mutations = ok(engine.drain_mutations());
        assert_eq!(
            mutations,
            vec![DomMutation::SetTitle {
                text: "early,frame@16,late".to_owned()
            }]
        );
    }

    #[test]
    fn cleared_and_repeating_timers() {
        let mut engine = engine();
        run(
            &mut engine,
            "globalThis.ticks = 0; var id = setInterval(function () { ticks += 1; if (ticks === 3) clearInterval(id); }, 20);\
             var dropped = setTimeout(function () { globalThis.dropped = true; }, 5); clearTimeout(dropped);",
        );
        assert_eq!(ok(engine.run_due_timers(200)), 3);
        assert_eq!(ok(engine.global_flag("dropped")), GlobalFlag::Undefined);
    }

    #[test]
    fn lifecycle_events_reach_listeners() {
        let mut engine = engine();
        run(
            &mut engine,
            "document.addEventListener('DOMContentLoaded', function () { globalThis.domReady = document.readyState === 'interactive'; });\
             window.addEventListener('load', function () { throw new Error('listener failure'); });\
             window.onload = function () { globalThis.loaded = true; };",
        );
        ok(engine.set_ready_state(ReadyState::Interactive));
        ok(engine.dispatch_document_event("DOMContentLoaded"));
        ok(engine.dispatch_window_event("load"));
        assert_eq!(ok(engine.global_flag("domReady")), GlobalFlag::True);
        assert_eq!(ok(engine.global_flag("loaded")), GlobalFlag::True);

        let console = ok(engine.drain_console());
        assert!(console
            .iter()
            .any(|message| message.level == ConsoleLevel::Error && message.text.contains("listener failure")));
        let events = ok(engine.take_dispatched_events());
        assert_eq!(events, vec!["readystatechange", "DOMContentLoaded", "load"]);
    }

    #[test]
    fn script_dispatched_custom_events_are_observable() {
        let mut engine = engine();
        run(
            &mut engine,
            "window.dispatchEvent(new CustomEvent('acfh:app-ready', { detail: { ok: true } }));",
        );
        assert_eq!(ok(engine.take_dispatched_events()), vec!["acfh:app-ready"]);
        assert!(ok(engine.take_dispatched_events()).is_empty());
    }

    #[test]
    fn dom_edits_are_recorded_against_mirrored_nodes() {
        let (document, app) = page();
        let mut engine = engine();
        ok(engine.sync_elements(&DomSnapshot::capture(&document), &[]));
        run(
            &mut engine,
            "var app = document.getElementById('app');\
             if (app.textContent !== 'hello') throw new Error('bad mirror');\
             if (document.title !== 'Before') throw new Error('bad title');\
             app.classList.add('ready');\
             app.textContent = 'rendered';\
             if (document.querySelector('div.shell.ready') !== app) throw new Error('bad selector');",
        );
        let key = app.to_string();
        assert_eq!(
            ok(engine.drain_mutations()),
            vec![
                DomMutation::SetAttribute {
                    node: key.clone(),
                    name: "class".to_owned(),
                    value: "shell ready".to_owned()
                },
                DomMutation::SetText {
                    node: key,
                    text: "rendered".to_owned()
                },
            ]
        );
    }

    #[test]
    fn inner_html_becomes_element_records() {
        let (document, app) = page();
        let mut engine = engine();
        ok(engine.sync_elements(&DomSnapshot::capture(&document), &[]));
        run(
            &mut engine,
            "document.getElementById('app').innerHTML = '<p class=\"x\">a &amp; b</p><br>';\
             if (!document.querySelector('#app p.x')) throw new Error('fragment not mirrored');",
        );
        let key = app.to_string();
        assert_eq!(
            ok(engine.drain_mutations()),
            vec![
                DomMutation::ClearChildren { node: key.clone() },
                DomMutation::CreateElement {
                    key: "new-1".to_owned(),
                    tag: "p".to_owned()
                },
                DomMutation::SetAttribute {
                    node: "new-1".to_owned(),
                    name: "class".to_owned(),
                    value: "x".to_owned()
                },
                DomMutation::AppendChild {
                    parent: key.clone(),
                    child: "new-1".to_owned()
                },
                DomMutation::AppendText {
                    parent: "new-1".to_owned(),
                    text: "a & b".to_owned()
                },
                DomMutation::CreateElement {
                    key: "new-2".to_owned(),
                    tag: "br".to_owned()
                },
                DomMutation::AppendChild {
                    parent: key,
                    child: "new-2".to_owned()
                },
            ]
        );
    }

    #[test]
    fn aliases_keep_created_element_references_alive() {
        let (mut document, _) = page();
        let mut engine = engine();
        ok(engine.sync_elements(&DomSnapshot::capture(&document), &[]));
        run(
            &mut engine,
            "globalThis.badge = document.createElement('span'); document.body.appendChild(badge);",
        );
        assert_eq!(ok(engine.drain_mutations()).len(), 2);

        let span = document.create_element("span");
        if let Some(body) = document.body() {
            document.append_child(body, span);
        }
        ok(engine.sync_elements(
            &DomSnapshot::capture(&document),
            &[KeyAlias("new-1".to_owned(), span)],
        ));
        run(&mut engine, "badge.setAttribute('data-state', 'live');");
        assert_eq!(
            ok(engine.drain_mutations()),
            vec![DomMutation::SetAttribute {
                node: span.to_string(),
                name: "data-state".to_owned(),
                value: "live".to_owned()
            }]
        );
    }

    #[test]
    fn detached_created_elements_survive_a_sync() {
        let (mut document, _) = page();
        let mut engine = engine();
        ok(engine.sync_elements(&DomSnapshot::capture(&document), &[]));
        run(&mut engine, "globalThis.later = document.createElement('aside');");
        assert_eq!(ok(engine.drain_mutations()).len(), 1);

        let aside = document.create_element("aside");
        ok(engine.sync_elements(
            &DomSnapshot::capture(&document),
            &[KeyAlias("new-1".to_owned(), aside)],
        ));
        run(&mut engine, "document.body.appendChild(later);");
        let mutations = ok(engine.drain_mutations());
        assert!(matches!(
            mutations.as_slice(),
            [DomMutation::AppendChild { child, .. }] if *child == aside.to_string()
        ));
    }

    #[test]
    fn location_reflects_page_url_and_console_is_captured() {
        let mut engine = engine();
        run(
            &mut engine,
            "console.log('path', location.pathname, { n: 1 }); console.warn(location.search);",
        );
        let console = ok(engine.drain_console());
        assert_eq!(console.len(), 2);
        assert_eq!(console[0].text, "path /dashboard {\"n\":1}");
        assert_eq!(console[1].level, ConsoleLevel::Warn);
        assert_eq!(console[1].text, "?tab=1");
    }

    #[test]
    fn oversized_scripts_are_skipped() {
        let host = JsHostEnvironment::default();
        let config = JsRuntimeConfig {
            max_script_bytes: 16,
            ..JsRuntimeConfig::default()
        };
        let mut engine = match ScriptEngine::new(config, &host) {
            Ok(engine) => engine,
            Err(error) => panic!("{error}"),
        };
        let outcome = engine.execute(&ScriptSource::new("inline:big", "globalThis.big = 1; // padding"));
        assert!(matches!(outcome, ScriptOutcome::Skipped { .. }));
        assert_eq!(ok(engine.global_flag("big")), GlobalFlag::Undefined);
    }
}
