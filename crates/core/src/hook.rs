//! Interception points around the model call.
//!
//! Hooks observe the [`AgentState`] and may return a [`StatePatch`] for the
//! fields they own. They cannot edit the conversation, stop the loop, or
//! trigger tool calls.

use crate::state::{AgentState, StatePatch};

/// When a hook runs within a loop iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Right before the model is called.
    BeforeModel,
    /// Right after the model response has been appended.
    AfterModel,
}

/// What a hook is told about the current iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookContext {
    phase: HookPhase,
    iteration: u32,
    has_tool_calls: Option<bool>,
}

impl HookContext {
    #[inline]
    pub(crate) fn before_model(iteration: u32) -> Self {
        Self {
            phase: HookPhase::BeforeModel,
            iteration,
            has_tool_calls: None,
        }
    }

    #[inline]
    pub(crate) fn after_model(iteration: u32, has_tool_calls: bool) -> Self {
        Self {
            phase: HookPhase::AfterModel,
            iteration,
            has_tool_calls: Some(has_tool_calls),
        }
    }

    /// Returns the phase the hook runs in.
    #[inline]
    pub fn phase(&self) -> HookPhase {
        self.phase
    }

    /// Returns the 1-based loop iteration, which is also the number of the
    /// model call this phase surrounds.
    #[inline]
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Returns whether the model response requested tool calls.
    ///
    /// Always `None` before the model is called.
    #[inline]
    pub fn has_tool_calls(&self) -> Option<bool> {
        self.has_tool_calls
    }
}

/// The result of running a hook.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum HookOutcome {
    /// Leave the state as it is.
    #[default]
    NoChange,
    /// Merge the patch into the state.
    Patch(StatePatch),
}

impl From<StatePatch> for HookOutcome {
    #[inline]
    fn from(patch: StatePatch) -> Self {
        Self::Patch(patch)
    }
}

/// A function run before or after every model call.
///
/// Any `Fn(&AgentState, &HookContext) -> HookOutcome` closure is a hook.
pub trait Hook: Send + Sync + 'static {
    /// Runs the hook against the current state.
    fn run(&self, state: &AgentState, ctx: &HookContext) -> HookOutcome;
}

impl<F> Hook for F
where
    F: Fn(&AgentState, &HookContext) -> HookOutcome + Send + Sync + 'static,
{
    #[inline]
    fn run(&self, state: &AgentState, ctx: &HookContext) -> HookOutcome {
        self(state, ctx)
    }
}

#[derive(Default)]
pub(crate) struct Hooks {
    before_model: Vec<Box<dyn Hook>>,
    after_model: Vec<Box<dyn Hook>>,
}

impl Hooks {
    pub fn add(&mut self, phase: HookPhase, hook: Box<dyn Hook>) {
        match phase {
            HookPhase::BeforeModel => self.before_model.push(hook),
            HookPhase::AfterModel => self.after_model.push(hook),
        }
    }

    /// Runs the hooks of `ctx.phase()` in registration order.
    pub fn run(&self, state: &mut AgentState, ctx: &HookContext) {
        let hooks = match ctx.phase() {
            HookPhase::BeforeModel => &self.before_model,
            HookPhase::AfterModel => &self.after_model,
        };
        for (idx, hook) in hooks.iter().enumerate() {
            match hook.run(state, ctx) {
                HookOutcome::NoChange => {}
                HookOutcome::Patch(patch) => {
                    trace!("hook #{idx} ({:?}) patched: {patch:?}", ctx.phase());
                    state.apply(patch);
                }
            }
        }
    }
}
