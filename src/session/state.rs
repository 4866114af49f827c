use std::collections::HashMap;

/// Mutable flags scoped to one session. Hooks and delegations read and write
/// these instead of process-wide globals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Set while the human wants a plan rather than edits.
    pub planning_mode: bool,
    prompt_counters: HashMap<String, u32>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more prompt under `key` and return the new count.
    pub fn count_prompt(&mut self, key: &str) -> u32 {
        let count = self.prompt_counters.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn prompt_count(&self, key: &str) -> u32 {
        self.prompt_counters.get(key).copied().unwrap_or(0)
    }

    /// Forget prompts counted under `key`, e.g. when the reminded-about topic came up.
    pub fn reset_prompt_count(&mut self, key: &str) {
        self.prompt_counters.remove(key);
    }
}
