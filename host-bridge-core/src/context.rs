//! The bridge context
//!
//! [`BridgeContext`] owns both callback tables and both service registries.
//! It is built empty, filled during start-up through `&mut` registration
//! methods, and then shared by reference for dispatch. The borrow checker
//! enforces the register-once, call-many lifecycle: nothing can register
//! while a dispatch borrow is alive.

use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::registry::{
    ConstraintDispatcher, ConstraintEvaluator, ConstraintInput, ConstraintOutput,
    PotentialCallback, PotentialDispatcher,
};
use crate::services::{DictionaryHandlers, DictionaryService, ErrorHandlers, ErrorService};
use crate::types::{HostHandle, Result};

/// Process-level registration and dispatch state
pub struct BridgeContext {
    config: BridgeConfig,
    constraints: ConstraintDispatcher,
    potentials: PotentialDispatcher,
    errors: ErrorService,
    dictionaries: DictionaryService,
}

impl BridgeContext {
    /// Create an empty context with the given configuration
    pub fn new(config: BridgeConfig) -> Self {
        log::debug!(
            "Creating bridge context ({} constraint slots, {} potential slots)",
            config.constraint_capacity,
            config.potential_capacity
        );
        Self {
            constraints: ConstraintDispatcher::new(config.constraint_capacity),
            potentials: PotentialDispatcher::new(config.potential_capacity),
            errors: ErrorService::new(config.error_info_len),
            dictionaries: DictionaryService::new(),
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn register_constraint(&mut self, evaluator: Box<dyn ConstraintEvaluator>) -> Result<usize> {
        self.constraints.register_constraint(evaluator)
    }

    pub fn invoke_constraint(
        &self,
        index: i64,
        input: &ConstraintInput<'_>,
        output: &mut ConstraintOutput<'_>,
    ) -> Result<()> {
        self.constraints.invoke_constraint(index, input, output)
    }

    pub fn register_potential_callback(&mut self, callback: Box<dyn PotentialCallback>) -> Result<usize> {
        self.potentials.register_potential_callback(callback)
    }

    pub fn invoke_potential_callback(&self, index: i64, atoms: HostHandle) -> Result<()> {
        self.potentials.invoke_potential_callback(index, atoms)
    }

    pub fn register_error_handlers(&mut self, handlers: Arc<dyn ErrorHandlers>) {
        self.errors.register_error_handlers(handlers)
    }

    pub fn register_dictionary_handlers(&mut self, handlers: Arc<dyn DictionaryHandlers>) {
        self.dictionaries.register_dictionary_handlers(handlers)
    }

    pub fn constraints(&self) -> &ConstraintDispatcher {
        &self.constraints
    }

    pub fn potentials(&self) -> &PotentialDispatcher {
        &self.potentials
    }

    /// Error-domain services
    pub fn errors(&self) -> &ErrorService {
        &self.errors
    }

    /// Dictionary-domain services
    pub fn dictionaries(&self) -> &DictionaryService {
        &self.dictionaries
    }
}

impl Default for BridgeContext {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BridgeError, ErrorKind, ServiceDomain};
    use rayon::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scaled(factor: f64) -> Box<dyn ConstraintEvaluator> {
        Box::new(move |input: &ConstraintInput<'_>, output: &mut ConstraintOutput<'_>| {
            output.c = factor * input.pos.iter().sum::<f64>();
            for g in output.dc_dr.iter_mut() {
                *g = factor;
            }
            output.dc_dt = input.t;
        })
    }

    #[test]
    fn test_context_uses_configured_capacities() {
        let mut ctx = BridgeContext::new(
            BridgeConfig::new()
                .with_constraint_capacity(1)
                .with_potential_capacity(0),
        );

        ctx.register_constraint(scaled(1.0)).unwrap();
        assert!(matches!(
            ctx.register_constraint(scaled(2.0)),
            Err(BridgeError::CapacityExceeded { capacity: 1, .. })
        ));
        assert!(ctx
            .register_potential_callback(Box::new(|_: HostHandle| {}))
            .is_err());
    }

    #[test]
    fn test_services_start_unregistered() {
        let ctx = BridgeContext::default();
        assert_eq!(
            ctx.errors().push("x", ErrorKind::Io, 1).unwrap_err(),
            BridgeError::ServiceNotRegistered(ServiceDomain::Error)
        );
        assert_eq!(
            ctx.dictionaries().query_key(HostHandle::NULL, "x").unwrap_err(),
            BridgeError::ServiceNotRegistered(ServiceDomain::Dictionary)
        );
    }

    #[test]
    fn test_tables_are_independent() {
        let mut ctx = BridgeContext::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        assert_eq!(ctx.register_constraint(scaled(1.0)).unwrap(), 0);
        assert_eq!(
            ctx.register_potential_callback(Box::new(move |_: HostHandle| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap(),
            0
        );
        assert_eq!(ctx.register_constraint(scaled(2.0)).unwrap(), 1);

        ctx.invoke_potential_callback(0, HostHandle::NULL).unwrap();
        assert!(ctx.invoke_potential_callback(1, HostHandle::NULL).is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.constraints().len(), 2);
        assert_eq!(ctx.potentials().len(), 1);
    }

    #[test]
    fn test_concurrent_dispatch_after_registration() {
        let mut ctx = BridgeContext::default();
        for factor in [1.0, 2.0, 3.0] {
            ctx.register_constraint(scaled(factor)).unwrap();
        }
        let ctx = ctx;

        let results: Vec<(f64, f64)> = (0..300i64)
            .into_par_iter()
            .map(|i| {
                let pos = [1.0, 2.0, 3.0];
                let mut grad = [0.0; 3];
                let mut out = ConstraintOutput::new(&mut grad);
                let input = ConstraintInput {
                    pos: &pos,
                    velo: &pos,
                    t: i as f64,
                    data: &[],
                };
                ctx.invoke_constraint(i % 3, &input, &mut out).unwrap();
                (out.c, out.dc_dt)
            })
            .collect();

        for (i, (c, dc_dt)) in results.into_iter().enumerate() {
            assert_eq!(c, 6.0 * ((i % 3) as f64 + 1.0));
            assert_eq!(dc_dt, i as f64);
        }
    }
}
