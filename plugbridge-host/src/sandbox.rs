//! Individual plugin sandbox: one Lua state per (plugin, surface).
//!
//! Each `SandboxRuntime` owns a Lua 5.4 state with:
//! - Only the `table`, `string`, `math` and `utf8` libraries, minus every
//!   global that loads code, touches the collector or writes to stdout
//! - A memory ceiling enforced by the engine allocator
//! - An instruction hook enforcing a step budget and a wall-clock deadline
//!   per call
//! - Pattern functions that refuse matches too costly to finish within that
//!   budget, since the matcher runs in C where the hook never fires
//! - Its own event registry and parked async callbacks
//!
//! Plugin failures never propagate out of this module; they are logged to
//! the plugin's logger and turned into neutral results.

use crate::error::{LoadError, RuntimeError, describe_lua_error};
use crate::events::EventRegistry;
use crate::features::FeatureContext;
use crate::logging::PluginLogger;
use crate::marshal;
use crate::permissions::PermissionSet;
use crate::registry::{CapabilityRegistry, InstallReport};
use mlua::{ChunkMode, Function, HookTriggers, Lua, LuaOptions, StdLib, Value, Variadic, VmState};
use plugbridge_types::{EventKind, Surface};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Globals removed from every sandbox after the libraries are opened.
const REMOVED_GLOBALS: &[&str] = &[
    "dofile",
    "loadfile",
    "load",
    "collectgarbage",
    "print",
    "require",
];

/// Resource limits for a plugin sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxLimits {
    /// Interpreter instructions allowed per call.
    pub step_budget: u64,
    /// Instructions between two budget checks.
    pub hook_interval: u32,
    /// Wall-clock ceiling per call in milliseconds.
    pub call_timeout_ms: u64,
    /// Engine allocation ceiling in bytes.
    pub max_memory_bytes: usize,
    /// Longest subject the `string` pattern functions accept.
    pub max_pattern_subject_bytes: usize,
    /// Backtracking quantifiers (`*`, `+`, `-`, `?`) allowed in one pattern.
    pub max_pattern_quantifiers: u32,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            step_budget: 10_000_000,
            hook_interval: 1_000,
            call_timeout_ms: 2_000,
            max_memory_bytes: 16 * 1024 * 1024, // 16MB
            max_pattern_subject_bytes: 64 * 1024,
            max_pattern_quantifiers: 4,
        }
    }
}

impl SandboxLimits {
    /// Tight limits for untrusted or misbehaving plugins.
    pub fn strict() -> Self {
        Self {
            step_budget: 1_000_000,
            hook_interval: 500,
            call_timeout_ms: 250,
            max_memory_bytes: 4 * 1024 * 1024, // 4MB
            max_pattern_subject_bytes: 16 * 1024,
            max_pattern_quantifiers: 3,
        }
    }
}

/// Lifecycle of a runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeState {
    /// API may be installed, source not yet evaluated.
    Fresh,
    /// Source evaluated; callbacks may be invoked.
    Ready,
    /// Load failed; nothing will ever be invoked.
    Failed(String),
    TornDown,
}

/// Resource usage for one runtime, for host consoles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeMetrics {
    pub invocations: u64,
    /// Invocations that threw or ran out of budget.
    pub faults: u64,
    pub steps_last_call: u64,
    pub steps_peak: u64,
    pub memory_used_bytes: usize,
}

/// Why the hook stopped a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Abort {
    Steps,
    Deadline,
}

/// Step and deadline accounting shared with the engine hook.
///
/// Nested calls (a capability re-entering the same runtime) share the
/// outermost call's budget.
#[derive(Debug)]
struct StepMeter {
    budget: u64,
    interval: u64,
    timeout: Duration,
    steps: Cell<u64>,
    deadline: Cell<Option<Instant>>,
    depth: Cell<u32>,
    abort: Cell<Option<Abort>>,
}

impl StepMeter {
    fn new(limits: &SandboxLimits) -> Self {
        Self {
            budget: limits.step_budget,
            interval: u64::from(limits.hook_interval.max(1)),
            timeout: Duration::from_millis(limits.call_timeout_ms),
            steps: Cell::new(0),
            deadline: Cell::new(None),
            depth: Cell::new(0),
            abort: Cell::new(None),
        }
    }

    fn begin(&self) {
        if self.depth.get() == 0 {
            self.steps.set(0);
            self.abort.set(None);
            self.deadline.set(Some(Instant::now() + self.timeout));
        }
        self.depth.set(self.depth.get() + 1);
    }

    /// Returns the step count when the outermost call finishes.
    fn end(&self) -> Option<u64> {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        if depth == 0 {
            self.deadline.set(None);
            Some(self.steps.get())
        } else {
            None
        }
    }

    fn tick(&self) -> Result<(), Abort> {
        if let Some(abort) = self.abort.get() {
            return Err(abort);
        }
        let steps = self.steps.get() + self.interval;
        self.steps.set(steps);
        let abort = if steps > self.budget {
            Some(Abort::Steps)
        } else if self.deadline.get().is_some_and(|d| Instant::now() >= d) {
            Some(Abort::Deadline)
        } else {
            None
        };
        match abort {
            Some(abort) => {
                self.abort.set(Some(abort));
                Err(abort)
            }
            None => Ok(()),
        }
    }

    fn aborted(&self) -> Option<Abort> {
        self.abort.get()
    }
}

/// What one `dispatch` did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    /// Handlers invoked (successfully or not).
    pub invoked: usize,
    /// Return values of the handlers that completed, in order.
    pub results: Vec<JsonValue>,
    pub faults: usize,
}

impl Dispatch {
    /// First non-empty string result, as used for render events.
    pub fn first_markup(&self) -> Option<&str> {
        self.results
            .iter()
            .filter_map(JsonValue::as_str)
            .find(|s| !s.is_empty())
    }
}

pub(crate) type SharedEvents = Rc<RefCell<EventRegistry<Function>>>;
pub(crate) type SharedPending = Rc<RefCell<HashMap<u64, Function>>>;

/// One isolated execution environment for one plugin on one surface.
pub struct SandboxRuntime {
    lua: Lua,
    surface: Surface,
    logger: PluginLogger,
    limits: SandboxLimits,
    state: RefCell<RuntimeState>,
    events: SharedEvents,
    pending: SharedPending,
    meter: Rc<StepMeter>,
    metrics: RefCell<RuntimeMetrics>,
}

impl SandboxRuntime {
    /// Creates a hardened Lua state. `logger` should already be scoped to
    /// the runtime's surface.
    pub fn new(surface: Surface, logger: PluginLogger, limits: SandboxLimits) -> Result<Self, LoadError> {
        let engine_err = |e: mlua::Error| LoadError::Engine(describe_lua_error(&e));

        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
            LuaOptions::new(),
        )
        .map_err(engine_err)?;
        lua.set_memory_limit(limits.max_memory_bytes).map_err(engine_err)?;

        let meter = Rc::new(StepMeter::new(&limits));
        harden(&lua, &meter, &logger, &limits).map_err(engine_err)?;

        let hook_meter = Rc::clone(&meter);
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(limits.hook_interval.max(1)),
            move |_lua, _debug| match hook_meter.tick() {
                Ok(()) => Ok(VmState::Continue),
                Err(abort) => Err(mlua::Error::runtime(abort_message(abort))),
            },
        );

        info!(
            plugin_id = %logger.plugin_id(),
            surface = %surface,
            "Sandbox runtime created"
        );

        Ok(Self {
            lua,
            surface,
            logger,
            limits,
            state: RefCell::new(RuntimeState::Fresh),
            events: Rc::new(RefCell::new(EventRegistry::new(surface))),
            pending: Rc::new(RefCell::new(HashMap::new())),
            meter,
            metrics: RefCell::new(RuntimeMetrics::default()),
        })
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    pub fn state(&self) -> RuntimeState {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == RuntimeState::Ready
    }

    pub(crate) fn events(&self) -> SharedEvents {
        Rc::clone(&self.events)
    }

    pub(crate) fn pending(&self) -> SharedPending {
        Rc::clone(&self.pending)
    }

    /// Installs the surface's capabilities as the global `api`.
    pub fn install_api(
        &self,
        registry: &CapabilityRegistry,
        ctx: &FeatureContext,
        permissions: &PermissionSet,
    ) -> Result<InstallReport, LoadError> {
        if *self.state.borrow() != RuntimeState::Fresh {
            return Err(LoadError::Engine("api must be installed before load".into()));
        }
        let engine_err = |e: mlua::Error| LoadError::Engine(describe_lua_error(&e));
        let api = self.lua.create_table().map_err(engine_err)?;
        let report = registry
            .install(&self.lua, &api, ctx, permissions)
            .map_err(engine_err)?;
        self.lua.globals().set("api", api).map_err(engine_err)?;
        Ok(report)
    }

    /// Evaluates the surface source once.
    ///
    /// Any failure marks the runtime failed for good and is written to the
    /// plugin log.
    pub fn load(&self, source: &str) -> Result<(), LoadError> {
        match self.state() {
            RuntimeState::Fresh => {}
            RuntimeState::Ready => {
                return Err(LoadError::Engine("source already loaded".into()));
            }
            RuntimeState::Failed(reason) => return Err(LoadError::AlreadyFailed(reason)),
            RuntimeState::TornDown => return Err(LoadError::TornDown),
        }

        self.meter.begin();
        let result = self
            .lua
            .load(source)
            .set_name(format!("={}:{}", self.logger.plugin_id(), self.surface))
            .set_mode(ChunkMode::Text)
            .exec();
        let aborted = self.meter.aborted();
        self.meter.end();

        match result {
            Ok(()) => {
                *self.state.borrow_mut() = RuntimeState::Ready;
                debug!(
                    plugin_id = %self.logger.plugin_id(),
                    surface = %self.surface,
                    handlers = self.events.borrow().total(),
                    "Plugin source loaded"
                );
                Ok(())
            }
            Err(err) => {
                let error = match (&err, aborted) {
                    (mlua::Error::SyntaxError { message, .. }, _) => LoadError::Syntax(message.clone()),
                    (_, Some(abort)) => LoadError::Evaluation(abort_message(abort).to_string()),
                    _ => LoadError::Evaluation(describe_lua_error(&err)),
                };
                self.logger.load(error.to_string());
                *self.state.borrow_mut() = RuntimeState::Failed(error.to_string());
                // Handlers registered before the failure must never run.
                self.events.borrow_mut().clear();
                Err(error)
            }
        }
    }

    /// Calls a plugin function synchronously.
    ///
    /// Thrown errors and budget exhaustion are logged and returned; the
    /// caller treats them as an empty result.
    pub fn invoke(&self, callback: &Function, args: &[JsonValue]) -> Result<JsonValue, RuntimeError> {
        if !self.is_ready() {
            let reason = format!("runtime is {:?}", self.state());
            self.logger.resolution(format!("invoke refused: {reason}"));
            return Err(RuntimeError::Unavailable(reason));
        }

        let args = match marshal::to_sandbox_args(&self.lua, args) {
            Ok(args) => args,
            Err(e) => {
                self.logger.runtime(format!("could not marshal arguments: {e}"));
                return Err(e.into());
            }
        };

        self.meter.begin();
        let result = callback.call::<Value>(args);
        let aborted = self.meter.aborted();
        let finished_steps = self.meter.end();
        self.record_call(finished_steps, result.is_err());

        let outcome = match result {
            Ok(value) => marshal::from_sandbox(&value).map_err(RuntimeError::from),
            Err(err) => Err(match aborted {
                Some(Abort::Steps) => RuntimeError::StepBudgetExceeded {
                    budget: self.limits.step_budget,
                },
                Some(Abort::Deadline) => RuntimeError::DeadlineExceeded {
                    timeout_ms: self.limits.call_timeout_ms,
                },
                None => RuntimeError::Thrown(describe_lua_error(&err)),
            }),
        };
        if let Err(e) = &outcome {
            self.logger.runtime(e.to_string());
        }
        outcome
    }

    /// Invokes every handler registered for `kind`, in registration order.
    ///
    /// The handler list is snapshotted first: handlers registered while this
    /// dispatch runs are only seen by later dispatches.
    pub fn dispatch(&self, kind: EventKind, args: &[JsonValue]) -> Dispatch {
        let handlers = self.events.borrow().handlers(kind);
        let mut dispatch = Dispatch::default();
        for handler in &handlers {
            dispatch.invoked += 1;
            match self.invoke(handler, args) {
                Ok(value) => dispatch.results.push(value),
                Err(_) => dispatch.faults += 1,
            }
        }
        dispatch
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.events.borrow().count(kind)
    }

    /// Removes a parked async callback.
    pub(crate) fn take_pending(&self, ticket: u64) -> Option<Function> {
        self.pending.borrow_mut().remove(&ticket)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn metrics(&self) -> RuntimeMetrics {
        let mut metrics = self.metrics.borrow().clone();
        metrics.memory_used_bytes = self.lua.used_memory();
        metrics
    }

    /// Stops all future invocation and drops every handle into the state.
    pub fn teardown(&self) {
        *self.state.borrow_mut() = RuntimeState::TornDown;
        self.events.borrow_mut().clear();
        self.pending.borrow_mut().clear();
        self.lua.remove_hook();
        debug!(
            plugin_id = %self.logger.plugin_id(),
            surface = %self.surface,
            "Sandbox runtime torn down"
        );
    }

    fn record_call(&self, finished_steps: Option<u64>, faulted: bool) {
        let mut metrics = self.metrics.borrow_mut();
        metrics.invocations += 1;
        if faulted {
            metrics.faults += 1;
        }
        if let Some(steps) = finished_steps {
            metrics.steps_last_call = steps;
            metrics.steps_peak = metrics.steps_peak.max(steps);
        }
    }

    #[cfg(test)]
    pub(crate) fn lua(&self) -> &Lua {
        &self.lua
    }
}

impl std::fmt::Debug for SandboxRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxRuntime")
            .field("plugin_id", &self.logger.plugin_id())
            .field("surface", &self.surface)
            .field("state", &self.state.borrow())
            .finish()
    }
}

fn abort_message(abort: Abort) -> &'static str {
    match abort {
        Abort::Steps => "step budget exhausted",
        Abort::Deadline => "call deadline exceeded",
    }
}

/// Strips loaders, wraps the protected-call primitives so a budget abort
/// cannot be swallowed by plugin code, and guards the pattern matcher.
fn harden(lua: &Lua, meter: &Rc<StepMeter>, logger: &PluginLogger, limits: &SandboxLimits) -> mlua::Result<()> {
    let globals = lua.globals();
    for name in REMOVED_GLOBALS {
        globals.raw_set(*name, Value::Nil)?;
    }
    let string: Option<mlua::Table> = globals.get("string")?;
    if let Some(string) = &string {
        string.raw_set("dump", Value::Nil)?;
        guard_patterns(lua, string, logger, limits)?;
    }

    for name in ["pcall", "xpcall"] {
        let original: Option<Function> = globals.get(name)?;
        let Some(original) = original else {
            continue;
        };
        let meter = Rc::clone(meter);
        let guarded = lua.create_function(move |_lua, args: Variadic<Value>| {
            let results: Variadic<Value> = original.call(args)?;
            match meter.aborted() {
                Some(abort) => Err(mlua::Error::runtime(abort_message(abort))),
                None => Ok(results),
            }
        })?;
        globals.raw_set(name, guarded)?;
    }
    Ok(())
}

/// Replaces `string.find`, `match`, `gmatch` and `gsub` with wrappers that
/// refuse a match whose worst-case backtracking exceeds the step budget.
///
/// The string metatable indexes the same table, so `s:find(...)` is guarded
/// too. A refusal is capability misuse: it is logged and yields nil, or an
/// exhausted iterator for `gmatch`.
fn guard_patterns(lua: &Lua, string: &mlua::Table, logger: &PluginLogger, limits: &SandboxLimits) -> mlua::Result<()> {
    for name in ["find", "match", "gmatch", "gsub"] {
        let original: Option<Function> = string.get(name)?;
        let Some(original) = original else {
            continue;
        };
        let logger = logger.clone();
        let limits = limits.clone();
        let guarded = lua.create_function(move |lua, args: Variadic<Value>| {
            let plain = name == "find" && args.get(3).is_some_and(|v| !matches!(v, Value::Nil | Value::Boolean(false)));
            let refusal = match (args.first(), args.get(1)) {
                (Some(Value::String(subject)), Some(Value::String(pattern))) if !plain => {
                    let anchorable = name != "gmatch";
                    check_pattern(&subject.as_bytes(), &pattern.as_bytes(), anchorable, &limits).err()
                }
                _ => None,
            };
            match refusal {
                None => original.call::<Variadic<Value>>(args),
                Some(reason) => {
                    logger.capability(format!("string.{name}: {reason}"));
                    let refused = if name == "gmatch" {
                        Value::Function(lua.create_function(|_, _: Variadic<Value>| Ok(Value::Nil))?)
                    } else {
                        Value::Nil
                    };
                    Ok(Variadic::from_iter([refused]))
                }
            }
        })?;
        string.raw_set(name, guarded)?;
    }
    Ok(())
}

/// Rejects a match that could backtrack beyond the call's step budget.
///
/// Each quantifier with more pattern after it can retry once per subject
/// byte, and an unanchored search adds one more factor for the start
/// position, so the estimate is `(len + 1) ^ (quantifiers + unanchored)`.
fn check_pattern(subject: &[u8], pattern: &[u8], anchorable: bool, limits: &SandboxLimits) -> Result<(), String> {
    if subject.len() > limits.max_pattern_subject_bytes {
        return Err(format!(
            "subject of {} bytes exceeds the {}-byte pattern limit",
            subject.len(),
            limits.max_pattern_subject_bytes
        ));
    }
    let shape = PatternShape::scan(pattern);
    if shape.backtracking > limits.max_pattern_quantifiers {
        return Err(format!(
            "pattern has {} backtracking quantifiers, at most {} allowed",
            shape.backtracking, limits.max_pattern_quantifiers
        ));
    }
    let exponent = shape.backtracking + u32::from(!(anchorable && shape.anchored));
    let base = subject.len() as u64 + 1;
    let work = (0..exponent).fold(1u64, |acc, _| acc.saturating_mul(base));
    if work > limits.step_budget {
        return Err(format!(
            "pattern is too expensive for a {}-byte subject",
            subject.len()
        ));
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct PatternShape {
    anchored: bool,
    /// Quantifiers followed by further items. A quantifier at the end of the
    /// pattern never backtracks.
    backtracking: u32,
}

impl PatternShape {
    fn scan(pattern: &[u8]) -> Self {
        let mut shape = PatternShape {
            anchored: pattern.first() == Some(&b'^'),
            backtracking: 0,
        };
        let mut i = usize::from(shape.anchored);
        while i < pattern.len() {
            let item_end = match pattern[i] {
                b'(' | b')' => {
                    i += 1;
                    continue;
                }
                b'$' if i + 1 == pattern.len() => break,
                b'%' => match pattern.get(i + 1) {
                    // %bxy matches balanced pairs and takes no quantifier.
                    Some(b'b') => {
                        i += 4;
                        continue;
                    }
                    Some(b'f') => {
                        i = set_end(pattern, i + 2);
                        continue;
                    }
                    _ => i + 2,
                },
                b'[' => set_end(pattern, i),
                _ => i + 1,
            };
            i = item_end;
            if matches!(pattern.get(i), Some(b'*' | b'+' | b'-' | b'?')) {
                i += 1;
                if !only_closers_follow(&pattern[i.min(pattern.len())..]) {
                    shape.backtracking += 1;
                }
            }
        }
        shape
    }
}

/// Index just past the `]` closing the set that opens at `start`.
fn set_end(pattern: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    if pattern.get(i) == Some(&b'^') {
        i += 1;
    }
    // A `]` right after the opening bracket is a literal.
    if pattern.get(i) == Some(&b']') {
        i += 1;
    }
    while i < pattern.len() {
        match pattern[i] {
            b'%' => i += 2,
            b']' => return i + 1,
            _ => i += 1,
        }
    }
    pattern.len()
}

fn only_closers_follow(rest: &[u8]) -> bool {
    match rest.split_last() {
        None => true,
        Some((b'$', init)) => init.iter().all(|b| *b == b')'),
        Some(_) => rest.iter().all(|b| *b == b')'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogCategory, MemorySink};
    use serde_json::json;

    fn runtime_with(limits: SandboxLimits) -> (SandboxRuntime, Rc<MemorySink>) {
        let sink = Rc::new(MemorySink::new());
        let logger = PluginLogger::new("acme.quiz", "Quiz", sink.clone()).for_surface(Surface::Player);
        (SandboxRuntime::new(Surface::Player, logger, limits).unwrap(), sink)
    }

    fn global_fn(runtime: &SandboxRuntime, name: &str) -> Function {
        runtime.lua().globals().get(name).unwrap()
    }

    #[test]
    fn invoke_returns_marshaled_value() {
        let (runtime, _) = runtime_with(SandboxLimits::default());
        runtime.load("function echo(x) return { got = x } end").unwrap();
        let out = runtime.invoke(&global_fn(&runtime, "echo"), &[json!([1, 2])]).unwrap();
        assert_eq!(out, json!({ "got": [1, 2] }));
    }

    #[test]
    fn thrown_error_is_contained_and_logged() {
        let (runtime, sink) = runtime_with(SandboxLimits::default());
        runtime.load("function boom() error('kaput') end").unwrap();
        let err = runtime.invoke(&global_fn(&runtime, "boom"), &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::Thrown(ref m) if m.contains("kaput")));
        assert_eq!(sink.count(LogCategory::Runtime), 1);
        assert_eq!(runtime.metrics().faults, 1);
    }

    #[test]
    fn step_budget_aborts_only_the_current_call() {
        let limits = SandboxLimits {
            step_budget: 50_000,
            hook_interval: 100,
            ..SandboxLimits::default()
        };
        let (runtime, _) = runtime_with(limits);
        runtime
            .load("function spin() while true do end end function ok() return 'fine' end")
            .unwrap();

        let err = runtime.invoke(&global_fn(&runtime, "spin"), &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::StepBudgetExceeded { budget: 50_000 }));
        assert_eq!(runtime.invoke(&global_fn(&runtime, "ok"), &[]).unwrap(), json!("fine"));
    }

    #[test]
    fn deadline_aborts_only_the_current_call() {
        let limits = SandboxLimits {
            step_budget: u64::MAX / 2,
            hook_interval: 100,
            call_timeout_ms: 50,
            ..SandboxLimits::default()
        };
        let (runtime, sink) = runtime_with(limits);
        runtime
            .load("function spin() while true do end end function ok() return 'fine' end")
            .unwrap();

        let started = Instant::now();
        let err = runtime.invoke(&global_fn(&runtime, "spin"), &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::DeadlineExceeded { timeout_ms: 50 }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(sink.count(LogCategory::Runtime), 1);

        assert_eq!(runtime.invoke(&global_fn(&runtime, "ok"), &[]).unwrap(), json!("fine"));
    }

    #[test]
    fn memory_ceiling_aborts_only_the_current_call() {
        let (runtime, sink) = runtime_with(SandboxLimits::strict());
        runtime
            .load(
                r#"
                function hoard()
                    local t = {}
                    for i = 1, 1e7 do t[i] = string.rep("x", 1024) .. i end
                end
                function ok() return 'fine' end
                "#,
            )
            .unwrap();

        let err = runtime.invoke(&global_fn(&runtime, "hoard"), &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::Thrown(ref m) if m.contains("memory")));
        assert_eq!(sink.count(LogCategory::Runtime), 1);
        assert!(runtime.is_ready());

        assert_eq!(runtime.invoke(&global_fn(&runtime, "ok"), &[]).unwrap(), json!("fine"));
        assert!(runtime.metrics().memory_used_bytes <= SandboxLimits::strict().max_memory_bytes);
    }

    #[test]
    fn backtracking_pattern_is_refused_before_it_runs() {
        let limits = SandboxLimits {
            step_budget: 50_000,
            call_timeout_ms: 100,
            ..SandboxLimits::default()
        };
        let (runtime, sink) = runtime_with(limits);
        runtime
            .load(
                r#"
                function crawl()
                    local s = string.rep('a', 3000)
                    return { string.find(s, '.-.-.-x') == nil, s:match('.-.-.-x') == nil }
                end
                "#,
            )
            .unwrap();

        let started = Instant::now();
        let out = runtime.invoke(&global_fn(&runtime, "crawl"), &[]).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(out, json!([true, true]));
        assert_eq!(sink.count(LogCategory::Capability), 2);
    }

    #[test]
    fn oversized_subject_yields_an_empty_gmatch() {
        let (runtime, sink) = runtime_with(SandboxLimits::default());
        runtime
            .load(
                r#"
                function words()
                    local n = 0
                    for _ in string.gmatch(string.rep('a', 70000), '%a+') do n = n + 1 end
                    return n
                end
                "#,
            )
            .unwrap();

        assert_eq!(runtime.invoke(&global_fn(&runtime, "words"), &[]).unwrap(), json!(0));
        assert_eq!(sink.count(LogCategory::Capability), 1);
    }

    #[test]
    fn everyday_patterns_still_match() {
        let (runtime, sink) = runtime_with(SandboxLimits::default());
        runtime
            .load(
                r#"
                function patterns()
                    local k, v = ("key=value"):match("(%w+)=(%w+)")
                    local trimmed = ("  hi  "):match("^%s*(.-)%s*$")
                    local dashed = string.gsub("a b  c", "%s+", "-")
                    local count = 0
                    for _ in ("one two three"):gmatch("%a+") do count = count + 1 end
                    return { k, v, trimmed, dashed, count, (string.find("a.b", ".", 1, true)) }
                end
                "#,
            )
            .unwrap();

        let out = runtime.invoke(&global_fn(&runtime, "patterns"), &[]).unwrap();
        assert_eq!(out, json!(["key", "value", "hi", "a-b-c", 3, 2]));
        assert_eq!(sink.count(LogCategory::Capability), 0);
    }

    #[test]
    fn pattern_shape_counts_backtracking_quantifiers() {
        let shape = |p: &str| PatternShape::scan(p.as_bytes());
        assert_eq!(shape(".-.-.-x"), PatternShape { anchored: false, backtracking: 3 });
        assert_eq!(shape("^%s*(.-)%s*$"), PatternShape { anchored: true, backtracking: 2 });
        assert_eq!(shape("%a+"), PatternShape { anchored: false, backtracking: 0 });
        assert_eq!(shape("[%-*]+x"), PatternShape { anchored: false, backtracking: 1 });
        assert_eq!(shape("%b()x*y"), PatternShape { anchored: false, backtracking: 1 });
    }

    #[test]
    fn pcall_cannot_swallow_budget_abort() {
        let limits = SandboxLimits {
            step_budget: 50_000,
            hook_interval: 100,
            ..SandboxLimits::default()
        };
        let (runtime, _) = runtime_with(limits);
        runtime
            .load("function sneaky() while true do pcall(function() while true do end end) end end")
            .unwrap();
        let err = runtime.invoke(&global_fn(&runtime, "sneaky"), &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::StepBudgetExceeded { .. }));
    }

    #[test]
    fn loaders_and_dump_are_removed() {
        let (runtime, _) = runtime_with(SandboxLimits::default());
        runtime
            .load(
                r#"
                function probe()
                    return { load == nil, dofile == nil, loadfile == nil, require == nil,
                             print == nil, collectgarbage == nil, string.dump == nil,
                             io == nil, os == nil, debug == nil }
                end
                "#,
            )
            .unwrap();
        let out = runtime.invoke(&global_fn(&runtime, "probe"), &[]).unwrap();
        assert_eq!(out, json!([true, true, true, true, true, true, true, true, true, true]));
    }

    #[test]
    fn syntax_error_fails_runtime_for_good() {
        let (runtime, sink) = runtime_with(SandboxLimits::default());
        let err = runtime.load("function (").unwrap_err();
        assert!(matches!(err, LoadError::Syntax(_)));
        assert!(matches!(runtime.state(), RuntimeState::Failed(_)));
        assert_eq!(sink.count(LogCategory::Load), 1);
        assert!(matches!(runtime.load("x = 1"), Err(LoadError::AlreadyFailed(_))));
    }

    #[test]
    fn top_level_error_fails_runtime() {
        let (runtime, _) = runtime_with(SandboxLimits::default());
        let err = runtime.load("error('no thanks')").unwrap_err();
        assert!(matches!(err, LoadError::Evaluation(ref m) if m.contains("no thanks")));
        assert!(!runtime.is_ready());
    }

    #[test]
    fn torn_down_runtime_refuses_invoke() {
        let (runtime, sink) = runtime_with(SandboxLimits::default());
        runtime.load("function f() return 1 end").unwrap();
        let f = global_fn(&runtime, "f");
        runtime.teardown();
        assert!(matches!(runtime.invoke(&f, &[]), Err(RuntimeError::Unavailable(_))));
        assert_eq!(sink.count(LogCategory::Resolution), 1);
    }

    #[test]
    fn metrics_track_steps() {
        let limits = SandboxLimits {
            hook_interval: 10,
            ..SandboxLimits::default()
        };
        let (runtime, _) = runtime_with(limits);
        runtime
            .load("function work() local n = 0 for i = 1, 1000 do n = n + i end return n end")
            .unwrap();
        runtime.invoke(&global_fn(&runtime, "work"), &[]).unwrap();
        let metrics = runtime.metrics();
        assert_eq!(metrics.invocations, 1);
        assert!(metrics.steps_last_call > 0);
        assert!(metrics.memory_used_bytes > 0);
    }
}
