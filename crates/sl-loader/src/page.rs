//! The live page: the document the loader edits plus the script realm that
//! runs against it.

use crate::ready::AppReadiness;
use crate::ready::HoldState;
use crate::ready::ReadinessSignal;
use crate::settle::MutationSource;
use sl_core::LoaderResult;
use sl_dom::Document;
use sl_dom::NodeId;
use sl_js::DomMutation;
use sl_js::DomSnapshot;
use sl_js::GlobalFlag;
use sl_js::JsHostEnvironment;
use sl_js::JsRuntimeConfig;
use sl_js::KeyAlias;
use sl_js::NodeRef;
use sl_js::ReadyState;
use sl_js::ScriptEngine;
use sl_js::ScriptOutcome;
use sl_js::ScriptSource;
use std::collections::HashMap;
use tokio::time::Instant;
use tracing::debug;

/// Counters from one [`LivePage::pump`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub timers_run: usize,
    pub mutations_applied: usize,
    pub mutations_dropped: usize,
}

/// A document with a script engine attached.
///
/// Script-side DOM edits are queued inside the engine and land in the
/// document only when the page is pumped. Host-side edits reach scripts
/// lazily: the mirror is refreshed before script code next runs.
#[derive(Debug)]
pub struct LivePage {
    document: Document,
    engine: ScriptEngine,
    epoch: Instant,
    synced_generation: Option<u64>,
    created: HashMap<String, NodeId>,
    pending_aliases: Vec<KeyAlias>,
    hold_flag: String,
    ready_event: String,
    ready_seen: bool,
}

impl LivePage {
    pub fn new(
        document: Document,
        js_config: JsRuntimeConfig,
        host: &JsHostEnvironment,
        hold_flag: impl Into<String>,
        ready_event: impl Into<String>,
    ) -> LoaderResult<Self> {
        let engine = ScriptEngine::new(js_config, host)?;
        Ok(Self {
            document,
            engine,
            epoch: Instant::now(),
            synced_generation: None,
            created: HashMap::new(),
            pending_aliases: Vec::new(),
            hold_flag: hold_flag.into(),
            ready_event: ready_event.into(),
            ready_seen: false,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn engine(&self) -> &ScriptEngine {
        &self.engine
    }

    /// Milliseconds since the page was opened, on tokio's clock.
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Runs `script` against the current document, then pumps.
    pub fn execute(&mut self, script: &ScriptSource) -> LoaderResult<ScriptOutcome> {
        self.sync()?;
        let outcome = self.engine.execute(script);
        self.pump()?;
        Ok(outcome)
    }

    pub fn set_ready_state(&mut self, state: ReadyState) -> LoaderResult<()> {
        self.sync()?;
        self.engine.set_ready_state(state)?;
        self.pump().map(|_| ())
    }

    pub fn dispatch_document_event(&mut self, event_type: &str) -> LoaderResult<()> {
        self.sync()?;
        self.engine.dispatch_document_event(event_type)?;
        self.pump().map(|_| ())
    }

    pub fn dispatch_window_event(&mut self, event_type: &str) -> LoaderResult<()> {
        self.sync()?;
        self.engine.dispatch_window_event(event_type)?;
        self.pump().map(|_| ())
    }

    /// Runs due page timers, applies recorded DOM edits and forwards console
    /// output. Repeats while callbacks keep producing work, bounded per call.
    pub fn pump(&mut self) -> LoaderResult<PumpStats> {
        let mut stats = PumpStats::default();
        for _ in 0..8 {
            self.sync()?;
            let timers_run = self.engine.run_due_timers(self.now_ms())?;
            stats.timers_run = stats.timers_run.saturating_add(timers_run);

            let mutations = self.engine.drain_mutations()?;
            let recorded = mutations.len();
            for mutation in mutations {
                if self.apply(mutation) {
                    stats.mutations_applied = stats.mutations_applied.saturating_add(1);
                } else {
                    stats.mutations_dropped = stats.mutations_dropped.saturating_add(1);
                }
            }

            for event in self.engine.take_dispatched_events()? {
                if event == self.ready_event {
                    debug!(event = %event, "app signalled readiness");
                    self.ready_seen = true;
                }
            }
            for message in self.engine.drain_console()? {
                message.emit();
            }
            if timers_run == 0 && recorded == 0 {
                break;
            }
        }
        Ok(stats)
    }

    pub fn hold_flag(&mut self) -> LoaderResult<GlobalFlag> {
        self.engine.global_flag(&self.hold_flag)
    }

    fn sync(&mut self) -> LoaderResult<()> {
        let generation = self.document.mutation_log().generation;
        if self.synced_generation == Some(generation) && self.pending_aliases.is_empty() {
            return Ok(());
        }
        let snapshot = DomSnapshot::capture(&self.document);
        self.engine.sync_elements(&snapshot, &self.pending_aliases)?;
        self.pending_aliases.clear();
        self.created.clear();
        self.synced_generation = Some(generation);
        Ok(())
    }

    fn resolve(&self, key: &str) -> Option<NodeId> {
        match NodeRef::parse(key)? {
            NodeRef::Existing(node) => (node < self.document.node_count()).then_some(node),
            NodeRef::Created(key) => self.created.get(key).copied(),
        }
    }

    /// Replays one script-side edit. Returns false when it names unknown nodes.
    fn apply(&mut self, mutation: DomMutation) -> bool {
        match mutation {
            DomMutation::CreateElement { key, tag } => {
                let node = self.document.create_element(&tag);
                self.created.insert(key.clone(), node);
                self.pending_aliases.push(KeyAlias(key, node));
                true
            }
            DomMutation::SetAttribute { node, name, value } => self
                .resolve(&node)
                .map(|node| self.document.set_attr(node, &name, &value))
                .is_some(),
            DomMutation::RemoveAttribute { node, name } => self
                .resolve(&node)
                .map(|node| self.document.remove_attr(node, &name))
                .is_some(),
            DomMutation::SetText { node, text } => self
                .resolve(&node)
                .map(|node| self.document.set_text_content(node, &text))
                .is_some(),
            DomMutation::ClearChildren { node } => self
                .resolve(&node)
                .map(|node| self.document.remove_children(node))
                .is_some(),
            DomMutation::AppendChild { parent, child } => {
                match (self.resolve(&parent), self.resolve(&child)) {
                    (Some(parent), Some(child)) => {
                        self.document.append_child(parent, child);
                        true
                    }
                    _ => false,
                }
            }
            DomMutation::InsertBefore {
                parent,
                child,
                before,
            } => match (self.resolve(&parent), self.resolve(&child), self.resolve(&before)) {
                (Some(parent), Some(child), Some(before)) => {
                    self.document.insert_before(parent, child, before);
                    true
                }
                _ => false,
            },
            DomMutation::AppendText { parent, text } => match self.resolve(&parent) {
                Some(parent) => {
                    let text = self.document.create_text(&text);
                    self.document.append_child(parent, text);
                    true
                }
                None => false,
            },
            DomMutation::Remove { node } => self
                .resolve(&node)
                .map(|node| self.document.detach(node))
                .is_some(),
            DomMutation::SetTitle { text } => self.set_title(&text),
        }
    }

    fn set_title(&mut self, text: &str) -> bool {
        let existing = self
            .document
            .elements_by_tag(self.document.root(), "title")
            .into_iter()
            .next();
        let title = match (existing, self.document.head()) {
            (Some(title), _) => title,
            (None, Some(head)) => {
                let title = self.document.create_element("title");
                self.document.append_child(head, title);
                title
            }
            (None, None) => return false,
        };
        self.document.set_text_content(title, text);
        true
    }
}

impl AppReadiness for LivePage {
    fn poll_readiness(&mut self) -> LoaderResult<ReadinessSignal> {
        self.pump()?;
        let hold = match self.hold_flag()? {
            GlobalFlag::Undefined => HoldState::Undeclared,
            GlobalFlag::True => HoldState::Holding,
            GlobalFlag::False => HoldState::Released,
        };
        Ok(ReadinessSignal {
            hold,
            ready_event: self.ready_seen,
        })
    }
}

impl MutationSource for LivePage {
    fn observe(&mut self) -> LoaderResult<Option<u64>> {
        self.pump()?;
        Ok(Some(self.document.mutation_log().generation))
    }
}
