//! [`BlockingDevice`] – bridge from async code to blocking driver calls.

use std::sync::{Arc, Mutex, MutexGuard};

use rover_types::RoverError;

/// A driver handle whose calls block.
///
/// Clones share the same device and the same lock, so calls from different
/// tasks are serialised.
pub struct BlockingDevice<T: ?Sized> {
    name: Arc<str>,
    inner: Arc<Mutex<Box<T>>>,
}

impl<T: ?Sized> Clone for BlockingDevice<T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized + Send + 'static> BlockingDevice<T> {
    pub fn new(name: &str, device: Box<T>) -> Self {
        Self {
            name: Arc::from(name),
            inner: Arc::new(Mutex::new(device)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<T>>, RoverError> {
        self.inner
            .lock()
            .map_err(|_| RoverError::device(&*self.name, "device lock poisoned"))
    }

    /// Run `f` against the device on the current thread.
    ///
    /// Only for code that is already on a blocking thread.
    pub fn call_blocking<R>(
        &self,
        f: impl FnOnce(&mut T) -> Result<R, RoverError>,
    ) -> Result<R, RoverError> {
        let mut guard = self.lock()?;
        f(&mut **guard)
    }

    /// Run `f` against the device on the blocking pool.
    ///
    /// If the returned future is dropped the call still runs to completion;
    /// the next caller waits for it.
    pub async fn call<R, F>(&self, f: F) -> Result<R, RoverError>
    where
        F: FnOnce(&mut T) -> Result<R, RoverError> + Send + 'static,
        R: Send + 'static,
    {
        let device = self.clone();
        tokio::task::spawn_blocking(move || device.call_blocking(f))
            .await
            .map_err(|e| RoverError::device(&*self.name, format!("blocking call failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::DigitalPin;
    use rover_hal::sim::{PinLog, SimPin};

    #[tokio::test]
    async fn calls_run_against_the_device() {
        let log = PinLog::default();
        let pin: BlockingDevice<dyn DigitalPin> =
            BlockingDevice::new("lamp", SimPin::new("lamp", log.clone()));

        pin.call(|p| p.write(true)).await.unwrap();
        assert!(pin.call(|p| Ok(p.is_high())).await.unwrap());
        assert_eq!(log.writes().len(), 1);
        assert_eq!(pin.name(), "lamp");
    }

    #[tokio::test]
    async fn errors_propagate() {
        let log = PinLog::default();
        log.fail_pin("lamp");
        let pin: BlockingDevice<dyn DigitalPin> =
            BlockingDevice::new("lamp", SimPin::new("lamp", log));

        let err = pin.call(|p| p.write(true)).await.unwrap_err();
        assert_eq!(err.code(), "DEVICE_ERROR");
    }

    #[test]
    fn blocking_call_on_current_thread() {
        let log = PinLog::default();
        let pin: BlockingDevice<dyn DigitalPin> =
            BlockingDevice::new("lamp", SimPin::new("lamp", log));
        pin.call_blocking(|p| p.write(true)).unwrap();
        assert!(pin.call_blocking(|p| Ok(p.is_high())).unwrap());
    }
}
