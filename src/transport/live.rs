//! Live build status kept by every transport

use parking_lot::Mutex;

use crate::reload::{BuildStatus, ReloadEvent};

/// The latest status, updated from the published event stream
#[derive(Debug)]
pub struct LiveStatus {
    latest: Mutex<BuildStatus>,
}

impl LiveStatus {
    pub fn new(initial: BuildStatus) -> Self {
        Self {
            latest: Mutex::new(initial),
        }
    }

    /// A build replaces the status wholesale; errors attach to it until then
    pub fn apply(&self, event: &ReloadEvent) {
        match event {
            ReloadEvent::BuildEnd(status) => {
                *self.latest.lock() = status.clone();
            }
            ReloadEvent::BuildError { error } | ReloadEvent::HmrError { error, .. } => {
                self.latest.lock().error = Some(error.clone());
            }
            _ => {}
        }
    }

    pub fn current(&self) -> BuildStatus {
        self.latest.lock().clone()
    }

    pub fn version(&self) -> u64 {
        self.latest.lock().version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reload::NormalizedError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_sticks_until_next_build() {
        let live = LiveStatus::new(BuildStatus::initial(0));
        live.apply(&ReloadEvent::BuildError {
            error: NormalizedError {
                message: "boom".to_string(),
                stack: String::new(),
                plugin: None,
                id: None,
            },
        });
        assert!(live.current().error.is_some());
        assert_eq!(live.version(), 1);

        let mut next = BuildStatus::initial(5);
        next.version = 2;
        live.apply(&ReloadEvent::BuildEnd(next.clone()));
        assert_eq!(live.current(), next);
    }
}
