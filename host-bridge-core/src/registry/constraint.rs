//! Constraint subroutine registration and dispatch
//!
//! A constraint evaluator reads a configuration (positions, velocities, time
//! and an auxiliary data vector) and writes the constraint value, its gradient
//! with respect to position, and its time derivative.

use std::sync::Arc;

use super::CallbackTable;
use crate::types::{BridgeError, Result};

/// Read-only arguments of a constraint evaluation
#[derive(Debug, Clone, Copy)]
pub struct ConstraintInput<'a> {
    pub pos: &'a [f64],
    pub velo: &'a [f64],
    pub t: f64,
    pub data: &'a [f64],
}

/// Output slots of a constraint evaluation
///
/// `dc_dr` is borrowed from the caller and must be as long as `pos`.
#[derive(Debug)]
pub struct ConstraintOutput<'a> {
    /// Constraint value
    pub c: f64,
    /// Gradient with respect to position
    pub dc_dr: &'a mut [f64],
    /// Time derivative
    pub dc_dt: f64,
}

impl<'a> ConstraintOutput<'a> {
    /// Output slots writing the gradient into `dc_dr`
    pub fn new(dc_dr: &'a mut [f64]) -> Self {
        Self {
            c: 0.0,
            dc_dr,
            dc_dt: 0.0,
        }
    }
}

/// A constraint subroutine
pub trait ConstraintEvaluator: Send + Sync {
    fn evaluate(&self, input: &ConstraintInput<'_>, output: &mut ConstraintOutput<'_>);
}

impl<F> ConstraintEvaluator for F
where
    F: Fn(&ConstraintInput<'_>, &mut ConstraintOutput<'_>) + Send + Sync,
{
    fn evaluate(&self, input: &ConstraintInput<'_>, output: &mut ConstraintOutput<'_>) {
        self(input, output)
    }
}

/// Host-side constraint subroutine, every argument passed by reference
pub type ForeignConstraintSub = unsafe extern "C" fn(
    pos: *const f64,
    velo: *const f64,
    t: *const f64,
    data: *const f64,
    c: *mut f64,
    dc_dr: *mut f64,
    dc_dt: *mut f64,
);

/// Adapter dispatching to a host subroutine through its C entry point
#[derive(Debug, Clone, Copy)]
pub struct ForeignConstraint {
    sub: ForeignConstraintSub,
}

impl ForeignConstraint {
    /// Wrap a host subroutine
    ///
    /// # Safety
    ///
    /// `sub` must stay callable for the rest of the process, must only read
    /// as many elements as the host knows `pos`, `velo` and `data` hold, and
    /// must write at most `pos.len()` gradient elements.
    pub unsafe fn new(sub: ForeignConstraintSub) -> Self {
        Self { sub }
    }
}

impl ConstraintEvaluator for ForeignConstraint {
    fn evaluate(&self, input: &ConstraintInput<'_>, output: &mut ConstraintOutput<'_>) {
        // SAFETY: the contract of `ForeignConstraint::new`; `velo` and the
        // gradient were checked against `pos` by `evaluate_constraint`.
        unsafe {
            (self.sub)(
                input.pos.as_ptr(),
                input.velo.as_ptr(),
                &input.t,
                input.data.as_ptr(),
                &mut output.c,
                output.dc_dr.as_mut_ptr(),
                &mut output.dc_dt,
            )
        }
    }
}

/// Run `evaluator` after checking the slice lengths against `pos`
///
/// `velo` and `dc_dr` must both be as long as `pos`; otherwise nothing is
/// called and the output is left untouched.
pub fn evaluate_constraint(
    evaluator: &dyn ConstraintEvaluator,
    input: &ConstraintInput<'_>,
    output: &mut ConstraintOutput<'_>,
) -> Result<()> {
    if input.velo.len() != input.pos.len() {
        return Err(BridgeError::LengthMismatch {
            what: "constraint velocity",
            expected: input.pos.len(),
            actual: input.velo.len(),
        });
    }
    if output.dc_dr.len() != input.pos.len() {
        return Err(BridgeError::LengthMismatch {
            what: "constraint gradient",
            expected: input.pos.len(),
            actual: output.dc_dr.len(),
        });
    }

    evaluator.evaluate(input, output);
    Ok(())
}

/// Registers constraint evaluators and dispatches to them by index
pub struct ConstraintDispatcher {
    table: CallbackTable<Arc<dyn ConstraintEvaluator>>,
}

impl ConstraintDispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: CallbackTable::new("constraint", capacity),
        }
    }

    /// Register an evaluator and return the index it is dispatched by
    pub fn register_constraint(&mut self, evaluator: Box<dyn ConstraintEvaluator>) -> Result<usize> {
        self.table.register(Arc::from(evaluator))
    }

    /// Shared handle to the evaluator registered at `index`
    ///
    /// Lets a caller drop its borrow of the dispatcher (and any lock around
    /// it) before the evaluator runs.
    pub fn evaluator(&self, index: i64) -> Result<Arc<dyn ConstraintEvaluator>> {
        self.table.get(index).map(Arc::clone)
    }

    /// Evaluate the constraint registered at `index`
    ///
    /// Fails before calling anything if the index is unknown, or if the
    /// velocity or gradient slice is not as long as the position vector.
    pub fn invoke_constraint(
        &self,
        index: i64,
        input: &ConstraintInput<'_>,
        output: &mut ConstraintOutput<'_>,
    ) -> Result<()> {
        let evaluator = self.table.get(index)?;
        log::trace!("Dispatching constraint #{} ({} coordinates)", index, input.pos.len());
        evaluate_constraint(evaluator.as_ref(), input, output)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Distance of the first coordinate from a target stored in `data[0]`
    fn plane(input: &ConstraintInput<'_>, output: &mut ConstraintOutput<'_>) {
        output.c = input.pos[0] - input.data[0];
        output.dc_dr.fill(0.0);
        output.dc_dr[0] = 1.0;
        output.dc_dt = 0.0;
    }

    unsafe extern "C" fn foreign_bond(
        pos: *const f64,
        _velo: *const f64,
        t: *const f64,
        data: *const f64,
        c: *mut f64,
        dc_dr: *mut f64,
        dc_dt: *mut f64,
    ) {
        // Two coordinates, target length in data[0], growing at data[1] per unit time
        let d = *pos.add(1) - *pos;
        let target = *data + *data.add(1) * *t;
        *c = d - target;
        *dc_dr = -1.0;
        *dc_dr.add(1) = 1.0;
        *dc_dt = -*data.add(1);
    }

    fn boxed<F>(f: F) -> Box<dyn ConstraintEvaluator>
    where
        F: Fn(&ConstraintInput<'_>, &mut ConstraintOutput<'_>) + Send + Sync + 'static,
    {
        Box::new(f)
    }

    fn input<'a>(pos: &'a [f64], data: &'a [f64]) -> ConstraintInput<'a> {
        ConstraintInput {
            pos,
            velo: pos,
            t: 0.0,
            data,
        }
    }

    #[test]
    fn test_dispatch_by_registration_index() {
        let mut dispatcher = ConstraintDispatcher::new(4);
        let a = dispatcher.register_constraint(boxed(|_, out| out.c = 1.0)).unwrap();
        let b = dispatcher.register_constraint(boxed(|_, out| out.c = 2.0)).unwrap();
        assert_eq!((a, b), (0, 1));

        let pos = [0.0; 3];
        let mut grad = [0.0; 3];
        let mut out = ConstraintOutput::new(&mut grad);
        dispatcher.invoke_constraint(1, &input(&pos, &[]), &mut out).unwrap();
        assert_eq!(out.c, 2.0);

        dispatcher.invoke_constraint(0, &input(&pos, &[]), &mut out).unwrap();
        assert_eq!(out.c, 1.0);
    }

    #[test]
    fn test_plain_function_evaluator() {
        let mut dispatcher = ConstraintDispatcher::new(1);
        dispatcher.register_constraint(Box::new(plane)).unwrap();

        let pos = [3.5, 1.0];
        let mut grad = [9.0; 2];
        let mut out = ConstraintOutput::new(&mut grad);
        dispatcher.invoke_constraint(0, &input(&pos, &[1.5]), &mut out).unwrap();

        assert_eq!(out.c, 2.0);
        assert_eq!(grad, [1.0, 0.0]);
    }

    #[test]
    fn test_foreign_subroutine() {
        let mut dispatcher = ConstraintDispatcher::new(1);
        let sub = unsafe { ForeignConstraint::new(foreign_bond) };
        dispatcher.register_constraint(Box::new(sub)).unwrap();

        let pos = [1.0, 4.0];
        let data = [2.0, 0.5];
        let mut grad = [0.0; 2];
        let mut out = ConstraintOutput::new(&mut grad);
        let args = ConstraintInput {
            pos: &pos,
            velo: &pos,
            t: 2.0,
            data: &data,
        };
        dispatcher.invoke_constraint(0, &args, &mut out).unwrap();

        assert_eq!(out.c, 0.0);
        assert_eq!(out.dc_dt, -0.5);
        assert_eq!(grad, [-1.0, 1.0]);
    }

    #[test]
    fn test_gradient_length_mismatch() {
        let mut dispatcher = ConstraintDispatcher::new(1);
        dispatcher.register_constraint(Box::new(plane)).unwrap();

        let pos = [1.0, 2.0, 3.0];
        let mut grad = [7.0; 2];
        let mut out = ConstraintOutput::new(&mut grad);
        let err = dispatcher
            .invoke_constraint(0, &input(&pos, &[0.0]), &mut out)
            .unwrap_err();

        assert_eq!(
            err,
            BridgeError::LengthMismatch {
                what: "constraint gradient",
                expected: 3,
                actual: 2
            }
        );
        // Nothing was written
        assert_eq!(out.c, 0.0);
        assert_eq!(grad, [7.0; 2]);
    }

    #[test]
    fn test_velocity_length_mismatch() {
        let mut dispatcher = ConstraintDispatcher::new(1);
        dispatcher
            .register_constraint(boxed(|_: &ConstraintInput<'_>, out: &mut ConstraintOutput<'_>| {
                out.c = 1.0;
            }))
            .unwrap();

        let pos = [1.0, 2.0, 3.0];
        let velo = [0.0];
        let mut grad = [0.0; 3];
        let mut out = ConstraintOutput::new(&mut grad);
        let short_velo = ConstraintInput {
            pos: &pos,
            velo: &velo,
            t: 0.0,
            data: &[],
        };
        let err = dispatcher.invoke_constraint(0, &short_velo, &mut out).unwrap_err();

        assert_eq!(
            err,
            BridgeError::LengthMismatch {
                what: "constraint velocity",
                expected: 3,
                actual: 1
            }
        );
        // The evaluator never ran
        assert_eq!(out.c, 0.0);
    }

    #[test]
    fn test_invalid_index_has_no_side_effect() {
        let mut dispatcher = ConstraintDispatcher::new(2);
        dispatcher.register_constraint(Box::new(plane)).unwrap();

        let pos = [1.0];
        let mut grad = [5.0];
        let mut out = ConstraintOutput::new(&mut grad);
        for index in [-1, 1, 2] {
            let err = dispatcher
                .invoke_constraint(index, &input(&pos, &[0.0]), &mut out)
                .unwrap_err();
            assert!(matches!(err, BridgeError::InvalidIndex { .. }));
        }
        assert_eq!(out.c, 0.0);
        assert_eq!(grad, [5.0]);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut dispatcher = ConstraintDispatcher::new(1);
        dispatcher.register_constraint(Box::new(plane)).unwrap();
        let err = dispatcher.register_constraint(Box::new(plane)).unwrap_err();
        assert!(matches!(err, BridgeError::CapacityExceeded { capacity: 1, .. }));
        assert_eq!(dispatcher.len(), 1);
    }
}
