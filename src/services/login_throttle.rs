use crate::services::credential_store::LoginAttemptObserver;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use thiserror::Error;

/// Failures older than this no longer count.
pub const FAILURE_WINDOW: TimeDelta = TimeDelta::minutes(15);

#[derive(Error, Debug, PartialEq)]
pub enum ThrottleError {
    #[error("Too many failed attempts. Please wait {retry_after_secs} seconds before trying again.")]
    CoolingDown { retry_after_secs: i64 },
}

/// Cooldown tracking per key
#[derive(Clone, Debug)]
pub struct CooldownEntry {
    pub failed_attempts: u32,
    pub last_attempt: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}

impl CooldownEntry {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let locked = self.locked_until.is_some_and(|until| now < until);
        !locked && now - self.last_attempt > FAILURE_WINDOW
    }
}

fn cooldown_for(failed_attempts: u32) -> Option<TimeDelta> {
    match failed_attempts {
        0..=2 => None,
        3..=4 => Some(TimeDelta::seconds(10)),
        5..=7 => Some(TimeDelta::seconds(30)),
        8..=10 => Some(TimeDelta::seconds(60)),
        _ => Some(TimeDelta::seconds(300)),
    }
}

/// Counts an attempt against `key` unless it is cooling down. The check and
/// the increment happen under the same entry lock.
fn charge(
    cooldowns: &DashMap<String, CooldownEntry>,
    key: &str,
    kind: &str,
) -> Result<(), ThrottleError> {
    let now = Utc::now();
    let mut entry = cooldowns
        .entry(key.to_string())
        .or_insert_with(|| CooldownEntry {
            failed_attempts: 0,
            last_attempt: now,
            locked_until: None,
        });

    if let Some(locked_until) = entry.locked_until
        && now < locked_until
    {
        return Err(ThrottleError::CoolingDown {
            retry_after_secs: (locked_until - now).num_seconds().max(1),
        });
    }

    if now - entry.last_attempt > FAILURE_WINDOW {
        entry.failed_attempts = 0;
        entry.locked_until = None;
    }

    entry.failed_attempts += 1;
    entry.last_attempt = now;

    if let Some(cooldown) = cooldown_for(entry.failed_attempts) {
        entry.locked_until = Some(now + cooldown);
        tracing::warn!(
            "{} {} hit {}s login cooldown after {} attempts",
            kind,
            key,
            cooldown.num_seconds(),
            entry.failed_attempts
        );
    }
    Ok(())
}

/// Escalating login cooldowns, keyed both by client address and by the
/// identifier being tried.
///
/// Every attempt is counted before the password is checked and forgiven on
/// success, so concurrent guesses cannot all slip past the same check.
#[derive(Default)]
pub struct LoginThrottle {
    clients: DashMap<String, CooldownEntry>,
    identifiers: DashMap<String, CooldownEntry>,
}

impl LoginThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one login attempt, or refuses it while either key cools down.
    pub fn begin<'a>(
        &'a self,
        client: &'a str,
        identifier: &'a str,
    ) -> Result<LoginAttempt<'a>, ThrottleError> {
        charge(&self.clients, client, "Client")?;
        charge(&self.identifiers, identifier, "Identifier")?;
        Ok(LoginAttempt {
            throttle: self,
            client,
        })
    }

    fn clear(&self, client: &str, identifier: &str) {
        self.clients.remove(client);
        self.identifiers.remove(identifier);
    }

    /// Drops entries whose failures fell out of the window and are not locked.
    pub fn purge_stale(&self) -> usize {
        let now = Utc::now();
        let before = self.tracked();
        self.clients.retain(|_, entry| !entry.is_stale(now));
        self.identifiers.retain(|_, entry| !entry.is_stale(now));
        before.saturating_sub(self.tracked())
    }

    pub fn tracked(&self) -> usize {
        self.clients.len() + self.identifiers.len()
    }
}

#[cfg(test)]
impl LoginThrottle {
    /// Records one failure that happened just outside the window.
    pub(crate) fn begin_aged(&self, client: &str, identifier: &str) {
        let aged = CooldownEntry {
            failed_attempts: 1,
            last_attempt: Utc::now() - FAILURE_WINDOW - TimeDelta::minutes(1),
            locked_until: None,
        };
        self.clients.insert(client.to_string(), aged.clone());
        self.identifiers.insert(identifier.to_string(), aged);
    }
}

/// One in-flight login attempt.
pub struct LoginAttempt<'a> {
    throttle: &'a LoginThrottle,
    client: &'a str,
}

impl LoginAttemptObserver for LoginAttempt<'_> {
    fn on_failure(&self, identifier: &str) {
        tracing::debug!("Failed login for {} from {}", identifier, self.client);
    }

    fn on_success(&self, identifier: &str) {
        self.throttle.clear(self.client, identifier);
    }
}
