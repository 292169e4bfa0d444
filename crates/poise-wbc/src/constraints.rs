//! Constraint assembler: dynamics, contact, task and actuator rows.
//!
//! Equalities, stacked in this order:
//! 1. floating-base dynamics      `H_float qdd - D_float beta = -C_float`
//! 2. relative acceleration       `Jp qdd + eps = (-Jpdot - k Jp) qd`      (contacts only)
//! 3. body acceleration           `Jb_row qdd = a_des - Jbdot_row qd`      (hard targets)
//! 4. specified joints            `qdd[j] = qdd_des[j]`
//!
//! Inequalities bound the actuator torque implied by the actuated rows of
//! the dynamics. `B_act` is orthogonal, so its transpose stands in for its
//! inverse:
//!
//! ```text
//!  B_actᵀ (H_act qdd - D_act beta) <= umax - B_actᵀ C_act
//! -B_actᵀ (H_act qdd - D_act beta) <= B_actᵀ C_act - umin
//! ```

use nalgebra::{DMatrix, DVector, RowDVector};

use crate::contact::ContactBasis;
use crate::problem::QpDimensions;
use crate::tasks::TaskRow;
use crate::types::{FORCE_COEFF_BOUND, QDD_BOUND};

pub const FLOATING_BASE_DYNAMICS: &str = "floating_base_dynamics";
pub const RELATIVE_ACCELERATION: &str = "relative_acceleration";
pub const BODY_ACCELERATION: &str = "body_acceleration";
pub const SPECIFIED_JOINTS: &str = "specified_joints";
pub const ACTUATOR_UPPER: &str = "actuator_upper";
pub const ACTUATOR_LOWER: &str = "actuator_lower";

/// Row range of one named block inside a [`ConstraintStack`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSpan {
    pub name: &'static str,
    pub start: usize,
    pub len: usize,
}

/// Linear constraint rows with their named blocks.
#[derive(Clone, Debug)]
pub struct ConstraintStack {
    pub matrix: DMatrix<f64>,
    pub rhs: DVector<f64>,
    pub blocks: Vec<BlockSpan>,
}

impl ConstraintStack {
    pub fn rows(&self) -> usize {
        self.matrix.nrows()
    }

    /// Span of the block called `name`, if it was emitted.
    pub fn block(&self, name: &str) -> Option<&BlockSpan> {
        self.blocks.iter().find(|b| b.name == name)
    }

    /// Rows emitted for `name` (zero when absent).
    pub fn block_rows(&self, name: &str) -> usize {
        self.block(name).map_or(0, |b| b.len)
    }
}

/// Appends named row blocks and tracks their offsets.
#[derive(Clone, Debug)]
pub struct ConstraintStackBuilder {
    ncols: usize,
    rows: Vec<(RowDVector<f64>, f64)>,
    blocks: Vec<BlockSpan>,
}

impl ConstraintStackBuilder {
    pub const fn new(ncols: usize) -> Self {
        Self {
            ncols,
            rows: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Append a block of rows. Empty blocks are not recorded.
    pub fn push_block(&mut self, name: &'static str, a: DMatrix<f64>, b: DVector<f64>) {
        debug_assert_eq!(a.ncols(), self.ncols, "block {name} has wrong column count");
        debug_assert_eq!(a.nrows(), b.len(), "block {name} rhs length mismatch");
        for (row, rhs) in a.row_iter().zip(b.iter()) {
            self.push_row(name, row.into_owned(), *rhs);
        }
    }

    /// Append one row, extending the trailing block when it has the same name.
    pub fn push_row(&mut self, name: &'static str, row: RowDVector<f64>, rhs: f64) {
        debug_assert_eq!(row.len(), self.ncols, "row in {name} has wrong column count");
        match self.blocks.last_mut() {
            Some(last) if last.name == name => last.len += 1,
            _ => self.blocks.push(BlockSpan {
                name,
                start: self.rows.len(),
                len: 1,
            }),
        }
        self.rows.push((row, rhs));
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn finish(self) -> ConstraintStack {
        let mut matrix = DMatrix::zeros(self.rows.len(), self.ncols);
        let mut rhs = DVector::zeros(self.rows.len());
        for (i, (row, b)) in self.rows.into_iter().enumerate() {
            matrix.row_mut(i).copy_from(&row);
            rhs[i] = b;
        }
        ConstraintStack {
            matrix,
            rhs,
            blocks: self.blocks,
        }
    }
}

/// Everything the constraint assembler reads for one tick.
pub struct ConstraintInputs<'a> {
    pub h_float: &'a DMatrix<f64>,
    pub c_float: &'a DVector<f64>,
    pub h_act: &'a DMatrix<f64>,
    pub c_act: &'a DVector<f64>,
    /// Actuated block of the actuation map (nu×nu, orthogonal).
    pub b_act: &'a DMatrix<f64>,
    pub umin: &'a DVector<f64>,
    pub umax: &'a DVector<f64>,
    pub contacts: &'a ContactBasis,
    pub qd: &'a DVector<f64>,
    pub qdd_des: &'a DVector<f64>,
    /// Hard body-acceleration rows.
    pub body_rows: &'a [TaskRow],
    /// 0-based joints pinned to `qdd_des`.
    pub constrained_joints: &'a [usize],
    pub relative_accel_damping: f64,
    pub slack_limit: f64,
}

/// Assembled constraint set.
#[derive(Clone, Debug)]
pub struct Constraints {
    pub equalities: ConstraintStack,
    pub inequalities: ConstraintStack,
    pub lb: DVector<f64>,
    pub ub: DVector<f64>,
}

/// Build equality, inequality and bound constraints sized to `dims`.
pub fn assemble_constraints(dims: &QpDimensions, inputs: &ConstraintInputs<'_>) -> Constraints {
    let n = dims.nparams;
    let (nq, nf, neps) = (dims.nq, dims.nf, dims.neps);
    let contacts = inputs.contacts;
    debug_assert_eq!(contacts.num_contacts, dims.nc, "contact basis sized for another tick");

    let mut eq = ConstraintStackBuilder::new(n);

    // Floating-base dynamics.
    let mut a_dyn = DMatrix::zeros(6, n);
    a_dyn.columns_mut(0, nq).copy_from(inputs.h_float);
    if dims.has_contacts() {
        let d_float = contacts.d.rows_range(dims.float_rows());
        a_dyn.columns_mut(nq, nf).copy_from(&(-d_float));
    }
    eq.push_block(FLOATING_BASE_DYNAMICS, a_dyn, -inputs.c_float);

    // Slack-softened relative acceleration of the contact points.
    if dims.has_contacts() {
        let mut a_rel = DMatrix::zeros(neps, n);
        a_rel.columns_mut(0, nq).copy_from(&contacts.jp);
        a_rel
            .view_mut((0, nq + nf), (neps, neps))
            .fill_with_identity();
        let k = inputs.relative_accel_damping;
        let b_rel = -(&contacts.jpdot + &contacts.jp * k) * inputs.qd;
        eq.push_block(RELATIVE_ACCELERATION, a_rel, b_rel);
    }

    for row in inputs.body_rows {
        eq.push_row(BODY_ACCELERATION, padded_row(&row.jacobian, n), row.rhs);
    }

    for &joint in inputs.constrained_joints {
        let mut row = RowDVector::zeros(n);
        row[joint] = 1.0;
        eq.push_row(SPECIFIED_JOINTS, row, inputs.qdd_des[joint]);
    }

    // Actuator saturation.
    let nu = dims.nu;
    let b_act_t = inputs.b_act.transpose();
    let mut a_tau = DMatrix::zeros(nu, n);
    a_tau
        .columns_mut(0, nq)
        .copy_from(&(&b_act_t * inputs.h_act));
    if dims.has_contacts() {
        let d_act = contacts.d.rows_range(dims.actuated_rows());
        a_tau
            .columns_mut(nq, nf)
            .copy_from(&(-(&b_act_t * d_act)));
    }
    let bias_torque = &b_act_t * inputs.c_act;

    let mut ineq = ConstraintStackBuilder::new(n);
    ineq.push_block(ACTUATOR_UPPER, a_tau.clone(), inputs.umax - &bias_torque);
    ineq.push_block(ACTUATOR_LOWER, -a_tau, bias_torque - inputs.umin);

    let mut lb = DVector::zeros(n);
    let mut ub = DVector::zeros(n);
    lb.rows_mut(0, nq).fill(-QDD_BOUND);
    ub.rows_mut(0, nq).fill(QDD_BOUND);
    ub.rows_mut(nq, nf).fill(FORCE_COEFF_BOUND);
    lb.rows_mut(nq + nf, neps).fill(-inputs.slack_limit);
    ub.rows_mut(nq + nf, neps).fill(inputs.slack_limit);

    Constraints {
        equalities: eq.finish(),
        inequalities: ineq.finish(),
        lb,
        ub,
    }
}

/// Extend an nq-wide row with zeros to the full parameter width.
fn padded_row(row: &RowDVector<f64>, n: usize) -> RowDVector<f64> {
    let mut out = RowDVector::zeros(n);
    out.columns_mut(0, row.len()).copy_from(row);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
