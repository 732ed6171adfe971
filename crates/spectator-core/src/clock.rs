use std::future::Future;
use std::pin::Pin;
#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

/// Source of time for every settle wait in the crate.
///
/// The control loop never calls `tokio::time::sleep` directly so tests can run thousands of
/// simulated seconds instantly.
pub trait Clock: Send + Sync {
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(tokio::time::sleep(duration))
    }

    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Virtual clock: sleeping returns immediately and advances `now` by the requested amount.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct FakeClock {
    inner: Mutex<FakeClockState>,
}

#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
struct FakeClockState {
    now: SystemTime,
    sleeps: Vec<Duration>,
}

#[cfg(any(test, feature = "testing"))]
impl Default for FakeClock {
    fn default() -> Self {
        Self::starting_at(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

#[cfg(any(test, feature = "testing"))]
impl FakeClock {
    pub fn starting_at(now: SystemTime) -> Self {
        Self {
            inner: Mutex::new(FakeClockState {
                now,
                sleeps: Vec::new(),
            }),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner.lock().unwrap().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.inner.lock().unwrap().sleeps.iter().sum()
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for FakeClock {
    fn sleep<'a>(&'a self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.now += duration;
            inner.sleeps.push(duration);
        }
        Box::pin(std::future::ready(()))
    }

    fn now(&self) -> SystemTime {
        self.inner.lock().unwrap().now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_clock_advances_virtual_time_on_sleep() {
        let clock = FakeClock::default();
        let start = clock.now();
        clock.sleep(Duration::from_secs(25)).await;
        clock.sleep(Duration::from_millis(80)).await;

        assert_eq!(
            clock.now().duration_since(start).unwrap(),
            Duration::from_millis(25_080)
        );
        assert_eq!(clock.sleeps().len(), 2);
        assert_eq!(clock.total_slept(), Duration::from_millis(25_080));
    }
}
