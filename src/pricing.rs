//! Runtime-adjustable unit price
//!
//! The price per litre can be changed while the daemon runs. A cycle takes a
//! snapshot with [`UnitPrice::current`] when it starts and hands it to the
//! reconciliation engine, so a change only affects points computed by later
//! cycles.

use crate::config::PricingConfig;
use crate::error::Result;
use crate::logging::get_logger;
use tokio::sync::watch;

/// Validated, shareable unit price
pub struct UnitPrice {
    config: PricingConfig,
    tx: watch::Sender<f64>,
    logger: crate::logging::StructuredLogger,
}

impl UnitPrice {
    /// Start from `initial`, checked against the configured bounds
    pub fn new(config: &PricingConfig, initial: f64) -> Result<Self> {
        config.validate_liter_cost(initial)?;
        let (tx, _rx) = watch::channel(initial);
        Ok(Self {
            config: config.clone(),
            tx,
            logger: get_logger("pricing"),
        })
    }

    /// Price per litre right now
    pub fn current(&self) -> f64 {
        *self.tx.borrow()
    }

    /// Currency code of the cost series
    pub fn currency(&self) -> &str {
        &self.config.currency
    }

    /// Check `value` against the bounds without applying it
    pub fn check(&self, value: f64) -> Result<()> {
        self.config.validate_liter_cost(value)
    }

    /// Change the price; rejected values leave the current price in place
    pub fn set(&self, value: f64) -> Result<()> {
        self.check(value)?;
        let previous = self.tx.send_replace(value);
        if (previous - value).abs() > f64::EPSILON {
            self.logger.info(&format!(
                "Unit price changed from {} to {} {}/L; applies to points computed from now on",
                previous, value, self.config.currency
            ));
        }
        Ok(())
    }

    /// Watch price changes
    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_bounds_price() {
        let cfg = PricingConfig::default();
        let price = UnitPrice::new(&cfg, 0.003).unwrap();

        assert!(price.set(0.0).is_err());
        assert!(price.set(f64::NAN).is_err());
        assert!(price.set(1.5).is_err());
        assert!((price.current() - 0.003).abs() < 1e-12);

        price.set(0.004).unwrap();
        assert!((price.current() - 0.004).abs() < 1e-12);
        assert_eq!(price.currency(), "GBP");
    }

    #[test]
    fn subscribers_see_changes() {
        let price = UnitPrice::new(&PricingConfig::default(), 0.003).unwrap();
        let rx = price.subscribe();
        price.set(0.005).unwrap();
        assert!((*rx.borrow() - 0.005).abs() < 1e-12);
    }

    #[test]
    fn initial_price_is_validated() {
        assert!(UnitPrice::new(&PricingConfig::default(), 5.0).is_err());
    }
}
