use super::loading::parse_address;
use super::types::LocusConfig;
use crate::error::CoreError;

impl LocusConfig {
    /// Validate the config: addresses must parse and the timeout must be positive.
    pub fn validate(&self) -> Result<(), CoreError> {
        parse_address("center.address", &self.center.address)?;
        parse_address("worker.address", &self.worker.address)?;
        self.validate_timeout()?;
        Ok(())
    }

    fn validate_timeout(&self) -> Result<(), CoreError> {
        if self.network.request_timeout_ms == 0 {
            return Err(CoreError::Config(
                "network.request_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
