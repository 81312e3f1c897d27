/// Single-flight execution and per-action authorization.
///
/// At most one action runs at a time, process wide, whatever the action
/// or the caller. A second invocation while one is running is rejected
/// immediately, never queued.
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::action::{runner, template, ActionDefinition, ActionError, RunOutcome};

#[derive(Debug, Default)]
pub struct InvocationGate {
    busy: AtomicBool,
}

/// Holds the execution slot; releases it when dropped, unwinding included.
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    gate: &'a InvocationGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl InvocationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if the caller is on the action's allow-list (or the list is empty).
    pub fn authorize(&self, def: &ActionDefinition, caller: &str) -> bool {
        def.is_authorized(caller)
    }

    /// Takes the slot if it is free. Check and set are one atomic step.
    pub fn try_acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Frees the slot. Pair with exactly one successful `try_acquire`.
    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Guard form of `try_acquire`/`release`.
    pub fn enter(&self) -> Option<GateGuard<'_>> {
        // Lazy: a guard built for a failed acquire would release on drop
        self.try_acquire().then(|| GateGuard { gate: self })
    }

    /// Authorize → acquire → expand → run → release.
    ///
    /// `Unauthorized` and `Busy` are returned before anything runs.
    /// Once the command ran, failures travel inside the `RunOutcome`.
    pub async fn invoke(
        &self,
        def: &ActionDefinition,
        caller: &str,
        user_args: &[String],
    ) -> Result<RunOutcome, ActionError> {
        self.invoke_with(def, caller, user_args, || {}).await
    }

    /// `invoke`, calling `on_start` once the slot is held and just before
    /// the command is launched (the chat layer shows "typing" there).
    pub async fn invoke_with(
        &self,
        def: &ActionDefinition,
        caller: &str,
        user_args: &[String],
        on_start: impl FnOnce(),
    ) -> Result<RunOutcome, ActionError> {
        if !self.authorize(def, caller) {
            info!("{caller} is not authorized to run {}", def.name);
            return Err(ActionError::Unauthorized {
                action: def.name.clone(),
                caller: caller.to_string(),
            });
        }

        let Some(_guard) = self.enter() else {
            info!("Rejected {} from {caller}: busy", def.name);
            return Err(ActionError::Busy);
        };

        let argv = template::expand(def, user_args);
        debug!("Running {} {:?}", def.command, argv);
        on_start();
        Ok(runner::run(def, &argv).await)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;

    fn action(users: &[&str]) -> ActionDefinition {
        ActionDefinition {
            name: "echo".to_string(),
            command: "echo".to_string(),
            params: vec!["word".to_string()],
            args: vec!["{0}".to_string()],
            authorized_users: users.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    // ── authorize tests ─────────────────────────────────

    #[test]
    fn test_authorize_unrestricted() {
        let gate = InvocationGate::new();
        let def = action(&[]);
        assert!(gate.authorize(&def, "U1"));
        assert!(gate.authorize(&def, "anyone"));
    }

    #[test]
    fn test_authorize_restricted() {
        let gate = InvocationGate::new();
        let def = action(&["U1", "U2"]);
        assert!(gate.authorize(&def, "U1"));
        assert!(gate.authorize(&def, "U2"));
        assert!(!gate.authorize(&def, "U3"));
    }

    // ── slot tests ──────────────────────────────────────

    #[test]
    fn test_try_acquire_release_cycle() {
        let gate = InvocationGate::new();
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        assert!(gate.is_busy());
        gate.release();
        assert!(!gate.is_busy());
        assert!(gate.try_acquire());
    }

    #[test]
    fn test_failed_enter_keeps_holder_slot() {
        let gate = InvocationGate::new();
        let _guard = gate.enter().unwrap();
        for _ in 0..3 {
            assert!(gate.enter().is_none());
        }
        assert!(gate.is_busy());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let gate = InvocationGate::new();
        {
            let _guard = gate.enter().unwrap();
            assert!(gate.enter().is_none());
        }
        assert!(!gate.is_busy());
        assert!(gate.enter().is_some());
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let gate = Arc::new(InvocationGate::new());
        let inner = gate.clone();
        let result = std::thread::spawn(move || {
            let _guard = inner.enter().unwrap();
            panic!("action blew up");
        })
        .join();
        assert!(result.is_err());
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_concurrent_acquire_single_winner() {
        let gate = Arc::new(InvocationGate::new());
        let holders = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = gate.clone();
                let holders = holders.clone();
                let overlap = overlap.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        if let Some(_guard) = gate.enter() {
                            if holders.fetch_add(1, Ordering::SeqCst) != 0 {
                                overlap.store(true, Ordering::SeqCst);
                            }
                            holders.fetch_sub(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(!overlap.load(Ordering::SeqCst));
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn test_parallel_tasks_one_acquires() {
        let gate = Arc::new(InvocationGate::new());
        let barrier = Arc::new(tokio::sync::Barrier::new(8));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    gate.try_acquire()
                })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    // ── invoke tests ────────────────────────────────────

    #[tokio::test]
    async fn test_invoke_unauthorized_does_not_take_slot() {
        let gate = InvocationGate::new();
        let def = action(&["U1"]);
        let err = gate
            .invoke(&def, "U9", &["hi".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Unauthorized { ref caller, .. } if caller == "U9"));
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn test_rejected_invocation_skips_on_start() {
        let gate = InvocationGate::new();
        let def = action(&["U1"]);
        let mut started = false;
        let result = gate
            .invoke_with(&def, "U9", &["hi".to_string()], || started = true)
            .await;
        assert!(result.is_err());
        assert!(!started);
    }

    #[tokio::test]
    async fn test_invoke_busy() {
        let gate = InvocationGate::new();
        let def = action(&[]);
        let _held = gate.enter().unwrap();
        let err = gate
            .invoke(&def, "U1", &["hi".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Busy));
        // The held slot is untouched by the rejected call
        assert!(gate.is_busy());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_runs_and_releases() {
        let gate = InvocationGate::new();
        let def = action(&["U1"]);
        let outcome = gate
            .invoke(&def, "U1", &["hello".to_string()])
            .await
            .unwrap();
        assert_eq!(outcome.result.exit_code, 0);
        assert_eq!(outcome.result.stdout, "hello\n");
        assert!(!gate.is_busy());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoke_releases_after_launch_failure() {
        let gate = InvocationGate::new();
        let def = ActionDefinition {
            name: "ghost".to_string(),
            command: "definitely-not-a-real-binary-4f2a".to_string(),
            ..Default::default()
        };
        let outcome = gate.invoke(&def, "U1", &[]).await.unwrap();
        assert_eq!(outcome.result.exit_code, 1);
        assert!(matches!(
            outcome.error,
            Some(ActionError::LaunchFailure { .. })
        ));
        assert!(!gate.is_busy());
    }
}
