//! Test helpers for plan fixtures and a scripted terraform executor
//!
//! `MockExecutor` keeps state files in a `MockFileSystem` as newline-separated
//! resource addresses, which is enough to follow what imports and merges do
//! without a real terraform binary.

#![cfg(test)]

use crate::executor::plan::{Action, Change, Plan, ResourceChange};
use crate::executor::{Executor, ImportOptions, StateMoveOptions};
use crate::import::candidate::Candidate;
use crate::traits::{FileSystem, MockFileSystem};
use anyhow::Result;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A resource change as it appears in `terraform show -json`
pub fn resource_change(
    address: &str,
    resource_type: &str,
    actions: Vec<Action>,
    after: Option<Value>,
) -> ResourceChange {
    ResourceChange {
        address: address.to_string(),
        resource_type: resource_type.to_string(),
        mode: Some("managed".to_string()),
        change: Change {
            actions: actions.into(),
            after,
        },
    }
}

/// A planned create of an ACI managed object
pub fn aci_create(address: &str, class_name: &str, dn: &str) -> ResourceChange {
    resource_change(
        address,
        "aci_rest_managed",
        vec![Action::Create],
        Some(json!({
            "class_name": class_name,
            "dn": dn,
            "content": {"name": dn.rsplit('/').next().unwrap_or(dn)},
        })),
    )
}

pub fn plan_with(changes: Vec<ResourceChange>) -> Plan {
    Plan {
        format_version: Some("1.1".to_string()),
        terraform_version: Some("1.3.6".to_string()),
        resource_changes: changes,
    }
}

/// Candidate for a tenant named `name`
pub fn candidate(name: &str) -> Candidate {
    Candidate::new(
        &format!("aci_rest_managed.{}", name),
        "fvTenant",
        &format!("uni/tn-{}", name),
        ".tmp.tfstate",
    )
}

#[derive(Default)]
struct Recorded {
    calls: Vec<String>,
    imports: Vec<ImportOptions>,
    import_attempts: HashMap<String, u32>,
    moves: Vec<StateMoveOptions>,
}

/// Scripted executor
pub struct MockExecutor {
    fs: Arc<MockFileSystem>,
    plan: Plan,
    has_changes: bool,
    failing_steps: HashSet<&'static str>,
    /// Remaining failures per import id (`u32::MAX` = always fail)
    import_failures: Mutex<HashMap<String, u32>>,
    /// Remaining failures per moved address
    move_failures: Mutex<HashMap<String, u32>>,
    import_delay: Option<Duration>,
    active_imports: AtomicUsize,
    max_active_imports: AtomicUsize,
    recorded: Mutex<Recorded>,
}

impl MockExecutor {
    pub fn new(fs: Arc<MockFileSystem>) -> Self {
        Self {
            fs,
            plan: plan_with(Vec::new()),
            has_changes: false,
            failing_steps: HashSet::new(),
            import_failures: Mutex::new(HashMap::new()),
            move_failures: Mutex::new(HashMap::new()),
            import_delay: None,
            active_imports: AtomicUsize::new(0),
            max_active_imports: AtomicUsize::new(0),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Plan `changes`; the plan reports changes when the list is non-empty
    pub fn with_plan(mut self, changes: Vec<ResourceChange>) -> Self {
        self.has_changes = !changes.is_empty();
        self.plan = plan_with(changes);
        self
    }

    /// Make `step` ("init", "plan" or "show") fail
    pub fn failing_step(mut self, step: &'static str) -> Self {
        self.failing_steps.insert(step);
        self
    }

    pub fn failing_import(self, id: &str, failures: u32) -> Self {
        self.import_failures
            .lock()
            .unwrap()
            .insert(id.to_string(), failures);
        self
    }

    pub fn failing_move(self, address: &str, failures: u32) -> Self {
        self.move_failures
            .lock()
            .unwrap()
            .insert(address.to_string(), failures);
        self
    }

    pub fn with_import_delay(mut self, delay: Duration) -> Self {
        self.import_delay = Some(delay);
        self
    }

    /// Lifecycle calls in order ("init", "plan", "show")
    pub fn calls(&self) -> Vec<String> {
        self.recorded.lock().unwrap().calls.clone()
    }

    pub fn imports(&self) -> Vec<ImportOptions> {
        self.recorded.lock().unwrap().imports.clone()
    }

    pub fn import_attempts(&self, id: &str) -> u32 {
        self.recorded
            .lock()
            .unwrap()
            .import_attempts
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn moves(&self) -> Vec<StateMoveOptions> {
        self.recorded.lock().unwrap().moves.clone()
    }

    pub fn max_concurrent_imports(&self) -> usize {
        self.max_active_imports.load(Ordering::SeqCst)
    }

    fn step(&self, name: &'static str) -> Result<()> {
        self.recorded.lock().unwrap().calls.push(name.to_string());
        if self.failing_steps.contains(name) {
            anyhow::bail!("terraform {} exited with 1: Error: mock failure", name);
        }
        Ok(())
    }

    fn take_failure(failures: &Mutex<HashMap<String, u32>>, key: &str) -> bool {
        let mut failures = failures.lock().unwrap();
        match failures.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
            _ => false,
        }
    }
}

impl Executor for MockExecutor {
    fn check_installed(&self) -> Result<bool> {
        Ok(true)
    }

    fn version(&self) -> Result<semver::Version> {
        Ok(semver::Version::new(1, 3, 6))
    }

    fn init(&self) -> Result<()> {
        self.step("init")
    }

    fn plan(&self, out: &Path) -> Result<bool> {
        self.step("plan")?;
        self.fs.write(out, "plan")?;
        Ok(self.has_changes)
    }

    fn show_plan(&self, _plan_file: &Path) -> Result<Plan> {
        self.step("show")?;
        Ok(self.plan.clone())
    }

    fn import(&self, address: &str, id: &str, options: &ImportOptions) -> Result<()> {
        {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.imports.push(options.clone());
            *recorded.import_attempts.entry(id.to_string()).or_insert(0) += 1;
        }

        let active = self.active_imports.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_imports.fetch_max(active, Ordering::SeqCst);
        if let Some(delay) = self.import_delay {
            std::thread::sleep(delay);
        }
        self.active_imports.fetch_sub(1, Ordering::SeqCst);

        if Self::take_failure(&self.import_failures, id) {
            anyhow::bail!("terraform import exited with 1: Error: throttled by controller");
        }

        self.fs.write(&options.state_out, &format!("{}\n", address))
    }

    fn state_mv(&self, source: &str, destination: &str, options: &StateMoveOptions) -> Result<()> {
        self.recorded.lock().unwrap().moves.push(options.clone());

        if Self::take_failure(&self.move_failures, source) {
            anyhow::bail!("terraform state mv exited with 1: Error acquiring the state lock");
        }

        let fragment = self.fs.read_to_string(&options.state)?;
        if !fragment.lines().any(|line| line == source) {
            anyhow::bail!("Invalid source address: {}", source);
        }
        let current = self.fs.read_to_string(&options.state_out)?;

        self.fs.write(&options.backup, &current)?;
        self.fs
            .write(&options.state_out, &format!("{}{}\n", current, destination))?;
        let remaining: String = fragment
            .lines()
            .filter(|line| *line != source)
            .map(|line| format!("{}\n", line))
            .collect();
        self.fs.write(&options.state, &remaining)
    }

    fn get_name(&self) -> &str {
        "mock"
    }
}
