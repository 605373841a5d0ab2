//! Per-client session state. A single mutex guards the four fields
//! together; every interpreter read or action-driven mutation takes the
//! lock just for that one access, never across a whole clause, so a
//! pathological client racing `/send` against `/echo` can't tear state.

use tokio::sync::Mutex;

pub const TERMINAL_STATE: i64 = -1;

struct Fields {
    state_index: i64,
    logged_in: bool,
    last_idle_seconds: i64,
    username: String,
}

pub struct Session {
    fields: Mutex<Fields>,
}

impl Session {
    /// A freshly connected guest session: `stateIndex=0 (Welcome)`, logged out.
    pub fn new_guest(username: String) -> Self {
        Session {
            fields: Mutex::new(Fields {
                state_index: 0,
                logged_in: false,
                last_idle_seconds: 0,
                username,
            }),
        }
    }

    pub async fn state_index(&self) -> i64 {
        self.fields.lock().await.state_index
    }

    pub async fn set_state_index(&self, idx: i64) {
        self.fields.lock().await.state_index = idx;
    }

    pub async fn is_logged_in(&self) -> bool {
        self.fields.lock().await.logged_in
    }

    pub async fn set_logged_in(&self, logged_in: bool) {
        self.fields.lock().await.logged_in = logged_in;
    }

    pub async fn username(&self) -> String {
        self.fields.lock().await.username.clone()
    }

    pub async fn set_username(&self, username: String) {
        self.fields.lock().await.username = username;
    }

    pub async fn last_idle_seconds(&self) -> i64 {
        self.fields.lock().await.last_idle_seconds
    }

    /// Atomically reads the previous idle clock and stores the new one,
    /// as `onTimeout` requires (`last = session.lastIdleSeconds; session.lastIdleSeconds = now`).
    pub async fn swap_last_idle_seconds(&self, now: i64) -> i64 {
        let mut f = self.fields.lock().await;
        let prev = f.last_idle_seconds;
        f.last_idle_seconds = now;
        prev
    }

    pub async fn is_terminal(&self) -> bool {
        self.state_index().await == TERMINAL_STATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_guest_starts_at_welcome_logged_out() {
        let s = Session::new_guest("Guest_1".to_string());
        assert_eq!(s.state_index().await, 0);
        assert!(!s.is_logged_in().await);
        assert_eq!(s.username().await, "Guest_1");
    }

    #[tokio::test]
    async fn swap_last_idle_seconds_returns_previous_value() {
        let s = Session::new_guest("Guest_1".to_string());
        let prev = s.swap_last_idle_seconds(60).await;
        assert_eq!(prev, 0);
        assert_eq!(s.last_idle_seconds().await, 60);
    }
}
