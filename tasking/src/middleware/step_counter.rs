//! Budget enforcement: step and token counters.
//!
//! Counters sit between agents and their LLM calls; sharing one counter
//! across every agent of a run gives a global budget. All variants guard
//! `current`/`limit` with a mutex and are safe to share across threads — they
//! are the only runtime objects with that guarantee.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::error::RuntimeError;
use crate::model::CompletionUsage;

/// Budget counter: step- or token-based.
#[async_trait]
pub trait StepCounter: Send + Sync {
    /// Unique id, for sharing diagnostics across agents.
    fn uid(&self) -> &str;

    fn limit(&self) -> u64;

    fn current(&self) -> u64;

    /// `Err(BudgetExceeded)` when the budget is already used up.
    async fn check_limit(&self) -> Result<(), RuntimeError>;

    /// Consumes budget for one completion. Rejects the step (without
    /// consuming) once it would push past the limit.
    async fn step(&self, usage: &CompletionUsage) -> Result<(), RuntimeError>;

    /// Replaces the limit.
    async fn update_limit(&self, limit: u64) -> Result<(), RuntimeError>;

    /// Adds to the limit.
    async fn recharge(&self, amount: u64) -> Result<(), RuntimeError>;

    /// Zeroes the current consumption.
    async fn reset(&self) -> Result<(), RuntimeError>;
}

struct Budget {
    current: u64,
    limit: u64,
}

impl Budget {
    /// Consumes `cost`, rejecting the attempt when it would exceed the limit.
    /// The error reports the attempted total.
    fn consume(&mut self, cost: u64) -> Result<(), RuntimeError> {
        let attempted = self.current + cost;
        if attempted > self.limit {
            return Err(RuntimeError::BudgetExceeded {
                current: attempted,
                limit: self.limit,
            });
        }
        self.current = attempted;
        Ok(())
    }
}

fn lock_budget(lock: &Mutex<Budget>) -> std::sync::MutexGuard<'_, Budget> {
    // Mutex poisoning only happens when a panic escaped while holding the
    // guard; the budget numbers stay valid, so keep going.
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Counts `step()` calls against a fixed, never-resettable limit.
pub struct MaxStepCounter {
    uid: String,
    budget: Mutex<Budget>,
}

impl MaxStepCounter {
    pub fn new(limit: u64) -> Self {
        Self {
            uid: Uuid::new_v4().simple().to_string(),
            budget: Mutex::new(Budget { current: 0, limit }),
        }
    }
}

#[async_trait]
impl StepCounter for MaxStepCounter {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn limit(&self) -> u64 {
        lock_budget(&self.budget).limit
    }

    fn current(&self) -> u64 {
        lock_budget(&self.budget).current
    }

    async fn check_limit(&self) -> Result<(), RuntimeError> {
        let budget = lock_budget(&self.budget);
        if budget.current >= budget.limit {
            return Err(RuntimeError::BudgetExceeded {
                current: budget.current,
                limit: budget.limit,
            });
        }
        Ok(())
    }

    async fn step(&self, _usage: &CompletionUsage) -> Result<(), RuntimeError> {
        lock_budget(&self.budget).consume(1)
    }

    async fn update_limit(&self, _limit: u64) -> Result<(), RuntimeError> {
        Err(RuntimeError::NotSupported(
            "update_limit is not supported for the max step counter",
        ))
    }

    async fn recharge(&self, _amount: u64) -> Result<(), RuntimeError> {
        Err(RuntimeError::NotSupported(
            "recharge is not supported for the max step counter",
        ))
    }

    async fn reset(&self) -> Result<(), RuntimeError> {
        Err(RuntimeError::NotSupported(
            "reset is not supported for the max step counter",
        ))
    }
}

/// Counts `step()` calls; the caller may reset, raise, or recharge the
/// budget. On a budget hit the step fails; recovery is an explicit
/// `reset`/`recharge` by the operator.
pub struct BaseStepCounter {
    uid: String,
    budget: Mutex<Budget>,
}

impl BaseStepCounter {
    pub fn new(limit: u64) -> Self {
        Self {
            uid: Uuid::new_v4().simple().to_string(),
            budget: Mutex::new(Budget { current: 0, limit }),
        }
    }
}

#[async_trait]
impl StepCounter for BaseStepCounter {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn limit(&self) -> u64 {
        lock_budget(&self.budget).limit
    }

    fn current(&self) -> u64 {
        lock_budget(&self.budget).current
    }

    async fn check_limit(&self) -> Result<(), RuntimeError> {
        let budget = lock_budget(&self.budget);
        if budget.current >= budget.limit {
            return Err(RuntimeError::BudgetExceeded {
                current: budget.current,
                limit: budget.limit,
            });
        }
        Ok(())
    }

    async fn step(&self, _usage: &CompletionUsage) -> Result<(), RuntimeError> {
        let mut budget = lock_budget(&self.budget);
        let result = budget.consume(1);
        if result.is_ok() {
            warn!(
                current = budget.current,
                limit = budget.limit,
                "step consumed"
            );
        }
        result
    }

    async fn update_limit(&self, limit: u64) -> Result<(), RuntimeError> {
        lock_budget(&self.budget).limit = limit;
        Ok(())
    }

    async fn recharge(&self, amount: u64) -> Result<(), RuntimeError> {
        lock_budget(&self.budget).limit += amount;
        Ok(())
    }

    async fn reset(&self) -> Result<(), RuntimeError> {
        lock_budget(&self.budget).current = 0;
        Ok(())
    }
}

/// Counts token usage (`usage.total_tokens`); recharge only, no reset.
pub struct TokenStepCounter {
    uid: String,
    budget: Mutex<Budget>,
}

impl TokenStepCounter {
    pub fn new(limit: u64) -> Self {
        Self {
            uid: Uuid::new_v4().simple().to_string(),
            budget: Mutex::new(Budget { current: 0, limit }),
        }
    }
}

#[async_trait]
impl StepCounter for TokenStepCounter {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn limit(&self) -> u64 {
        lock_budget(&self.budget).limit
    }

    fn current(&self) -> u64 {
        lock_budget(&self.budget).current
    }

    async fn check_limit(&self) -> Result<(), RuntimeError> {
        let budget = lock_budget(&self.budget);
        if budget.current >= budget.limit {
            return Err(RuntimeError::BudgetExceeded {
                current: budget.current,
                limit: budget.limit,
            });
        }
        Ok(())
    }

    async fn step(&self, usage: &CompletionUsage) -> Result<(), RuntimeError> {
        let mut budget = lock_budget(&self.budget);
        let result = budget.consume(usage.total_tokens);
        if result.is_ok() {
            warn!(
                current = budget.current,
                limit = budget.limit,
                "token usage consumed"
            );
        }
        result
    }

    async fn update_limit(&self, limit: u64) -> Result<(), RuntimeError> {
        lock_budget(&self.budget).limit = limit;
        Ok(())
    }

    async fn recharge(&self, amount: u64) -> Result<(), RuntimeError> {
        lock_budget(&self.budget).limit += amount;
        Ok(())
    }

    async fn reset(&self) -> Result<(), RuntimeError> {
        Err(RuntimeError::NotSupported(
            "reset is not supported for the token step counter, use recharge",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_usage() -> CompletionUsage {
        CompletionUsage::default()
    }

    /// **Scenario**: with limit 3, three steps succeed and the fourth fails
    /// reporting the attempted total of 4.
    #[tokio::test]
    async fn max_step_counter_rejects_fourth_step() {
        let counter = MaxStepCounter::new(3);
        for _ in 0..3 {
            counter.step(&no_usage()).await.expect("within budget");
        }
        let err = counter.step(&no_usage()).await.unwrap_err();
        match err {
            RuntimeError::BudgetExceeded { current, limit } => {
                assert_eq!(current, 4);
                assert_eq!(limit, 3);
            }
            other => panic!("expected BudgetExceeded, got {other:?}"),
        }
        assert_eq!(counter.current(), 3);
    }

    /// **Scenario**: max counter refuses reset, update_limit, and recharge.
    #[tokio::test]
    async fn max_step_counter_refuses_mutation() {
        let counter = MaxStepCounter::new(1);
        assert!(matches!(
            counter.reset().await,
            Err(RuntimeError::NotSupported(_))
        ));
        assert!(matches!(
            counter.update_limit(5).await,
            Err(RuntimeError::NotSupported(_))
        ));
        assert!(matches!(
            counter.recharge(5).await,
            Err(RuntimeError::NotSupported(_))
        ));
    }

    /// **Scenario**: at current == limit the next step fails and recharge(k)
    /// lets exactly k more steps through.
    #[tokio::test]
    async fn base_step_counter_recharge_extends_budget() {
        let counter = BaseStepCounter::new(2);
        counter.step(&no_usage()).await.expect("1");
        counter.step(&no_usage()).await.expect("2");
        assert!(counter.step(&no_usage()).await.is_err());
        counter.recharge(2).await.expect("recharge supported");
        counter.step(&no_usage()).await.expect("3");
        counter.step(&no_usage()).await.expect("4");
        assert!(counter.step(&no_usage()).await.is_err());
    }

    /// **Scenario**: base counter reset zeroes consumption.
    #[tokio::test]
    async fn base_step_counter_reset_zeroes() {
        let counter = BaseStepCounter::new(1);
        counter.step(&no_usage()).await.expect("1");
        counter.reset().await.expect("reset supported");
        assert_eq!(counter.current(), 0);
        counter.step(&no_usage()).await.expect("after reset");
    }

    /// **Scenario**: token counter consumes total_tokens and refuses reset.
    #[tokio::test]
    async fn token_step_counter_counts_tokens() {
        let counter = TokenStepCounter::new(100);
        let usage = CompletionUsage {
            prompt_tokens: 10,
            completion_tokens: 30,
            total_tokens: 40,
        };
        counter.step(&usage).await.expect("40");
        counter.step(&usage).await.expect("80");
        assert!(counter.step(&usage).await.is_err());
        assert_eq!(counter.current(), 80);
        assert!(matches!(
            counter.reset().await,
            Err(RuntimeError::NotSupported(_))
        ));
        counter.recharge(100).await.expect("recharge");
        counter.step(&usage).await.expect("120 of 200");
    }

    /// **Scenario**: check_limit errors only once the budget is used up.
    #[tokio::test]
    async fn check_limit_boundary() {
        let counter = BaseStepCounter::new(1);
        counter.check_limit().await.expect("budget open");
        counter.step(&no_usage()).await.expect("1");
        assert!(counter.check_limit().await.is_err());
    }
}
