//! Contact resolver: desired supports to active supports and friction-cone data.
//!
//! Each active contact point contributes `FRICTION_CONE_EDGES` unit edge
//! vectors of a pyramid inscribed in the Coulomb cone:
//!
//! ```text
//! b_j± = (n ± mu d_j) / sqrt(1 + mu²),   d_j = cos(jπ/m) t1 + sin(jπ/m) t2
//! ```
//!
//! A contact force is `B beta` with `beta >= 0`, and its generalized force
//! is `D beta` with `D = Jᵀ B`.

use std::collections::BTreeSet;
use std::f64::consts::PI;

use nalgebra::{DMatrix, Unit, Vector3};

use crate::error::InputError;
use crate::model::{RigidBodyModel, TerrainMap};
use crate::types::{
    FRICTION_CONE_EDGES, NUM_SURFACE_TANGENTS, RobotState, SupportRequest, SupportStateElement,
};

const NORMAL_EPSILON: f64 = 1e-8;

/// Stacked contact quantities for all active contact points.
#[derive(Clone, Debug)]
pub struct ContactBasis {
    /// Number of active contact points (nc).
    pub num_contacts: usize,
    /// Terrain normal under each point.
    pub normals: Vec<Unit<Vector3<f64>>>,
    /// 3×(nc·nd) friction-cone edge directions.
    pub basis: DMatrix<f64>,
    /// nq×(nc·nd) generalized directions `Jᵀ B`.
    pub d: DMatrix<f64>,
    /// 3nc×nq stacked point Jacobians.
    pub jp: DMatrix<f64>,
    /// Time derivative of `jp`.
    pub jpdot: DMatrix<f64>,
}

impl ContactBasis {
    /// Contact data for a tick with no active supports.
    pub fn empty(nq: usize) -> Self {
        Self {
            num_contacts: 0,
            normals: Vec::new(),
            basis: DMatrix::zeros(3, 0),
            d: DMatrix::zeros(nq, 0),
            jp: DMatrix::zeros(0, nq),
            jpdot: DMatrix::zeros(0, nq),
        }
    }

    /// nc×nq normal Jacobian, one row `nᵀ J` per point.
    pub fn normal_jacobian(&self) -> DMatrix<f64> {
        let mut out = DMatrix::zeros(self.num_contacts, self.jp.ncols());
        for (k, normal) in self.normals.iter().enumerate() {
            out.row_mut(k)
                .copy_from(&(normal.transpose() * self.jp.rows(3 * k, 3)));
        }
        out
    }
}

/// Convert the host's 1-based support descriptor into active supports.
///
/// Bodies with no listed contact points are skipped. Duplicate point
/// indices collapse.
pub fn resolve_supports<M: RigidBodyModel + ?Sized>(
    model: &M,
    requests: &[SupportRequest],
) -> Result<Vec<SupportStateElement>, InputError> {
    let num_bodies = model.num_bodies();
    let mut supports = Vec::with_capacity(requests.len());

    for request in requests {
        if request.contact_pts.is_empty() {
            continue;
        }
        let body = to_zero_based(request.body, "support body")?;
        if body >= num_bodies {
            return Err(InputError::UnknownBody {
                body: request.body,
                num_bodies,
            });
        }
        let num_points = model.num_contact_points(body);
        let mut contact_pt_inds = BTreeSet::new();
        for &pt in &request.contact_pts {
            let point = to_zero_based(pt, "contact point")?;
            if point >= num_points {
                return Err(InputError::UnknownContactPoint {
                    body: request.body,
                    point: pt,
                    num_points,
                });
            }
            contact_pt_inds.insert(point);
        }
        let contact_surface = to_zero_based(request.contact_surface, "contact surface")?;

        supports.push(SupportStateElement {
            body,
            contact_pt_inds,
            contact_surface,
        });
    }

    Ok(supports)
}

/// Total number of active contact points.
pub fn count_contact_points(supports: &[SupportStateElement]) -> usize {
    supports.iter().map(|s| s.contact_pt_inds.len()).sum()
}

/// Whether `body` is one of the active supports.
pub fn in_support(supports: &[SupportStateElement], body: usize) -> bool {
    supports.iter().any(|s| s.body == body)
}

/// Convert a 1-based host index to 0-based.
pub(crate) fn to_zero_based(index: usize, what: &'static str) -> Result<usize, InputError> {
    index.checked_sub(1).ok_or(InputError::ZeroIndex { what })
}

/// Tangent directions spanning the surface with the given normal.
///
/// Directions are spaced by `π / NUM_SURFACE_TANGENTS`, so together with
/// their negatives they cover the tangent plane evenly.
pub fn surface_tangents(normal: &Unit<Vector3<f64>>) -> [Vector3<f64>; NUM_SURFACE_TANGENTS] {
    let t1 = if 1.0 - normal.z < NORMAL_EPSILON {
        Vector3::x()
    } else if 1.0 + normal.z < NORMAL_EPSILON {
        -Vector3::x()
    } else {
        Vector3::new(normal.y, -normal.x, 0.0).normalize()
    };
    let t2 = t1.cross(normal);

    std::array::from_fn(|k| {
        #[allow(clippy::cast_precision_loss)]
        let theta = k as f64 * PI / NUM_SURFACE_TANGENTS as f64;
        theta.cos() * t1 + theta.sin() * t2
    })
}

/// Build stacked friction-cone and point-Jacobian data for the active supports.
///
/// Points are visited in support order, ascending point index within a body.
pub fn contact_basis<M: RigidBodyModel + ?Sized>(
    model: &M,
    state: &RobotState,
    supports: &[SupportStateElement],
    terrain: &dyn TerrainMap,
    mu: f64,
) -> ContactBasis {
    let nq = model.num_dof();
    let nc = count_contact_points(supports);
    if nc == 0 {
        return ContactBasis::empty(nq);
    }

    let nd = FRICTION_CONE_EDGES;
    let m = NUM_SURFACE_TANGENTS;
    let norm = (1.0 + mu * mu).sqrt();

    let mut normals = Vec::with_capacity(nc);
    let mut basis = DMatrix::zeros(3, nc * nd);
    let mut d = DMatrix::zeros(nq, nc * nd);
    let mut jp = DMatrix::zeros(3 * nc, nq);
    let mut jpdot = DMatrix::zeros(3 * nc, nq);

    let points = supports
        .iter()
        .flat_map(|s| s.contact_pt_inds.iter().map(move |&p| (s.body, p)));

    for (k, (body, point)) in points.enumerate() {
        let kin = model.contact_point(state, body, point);
        let normal = terrain.query(&kin.position).normal;
        let tangents = surface_tangents(&normal);

        let col = k * nd;
        for (j, t) in tangents.iter().enumerate() {
            let plus = (normal.into_inner() + mu * t) / norm;
            let minus = (normal.into_inner() - mu * t) / norm;
            basis.column_mut(col + j).copy_from(&plus);
            basis.column_mut(col + m + j).copy_from(&minus);
            d.column_mut(col + j)
                .copy_from(&(kin.jacobian.transpose() * plus));
            d.column_mut(col + m + j)
                .copy_from(&(kin.jacobian.transpose() * minus));
        }

        jp.rows_mut(3 * k, 3).copy_from(&kin.jacobian);
        jpdot.rows_mut(3 * k, 3).copy_from(&kin.jacobian_dot);
        normals.push(normal);
    }

    ContactBasis {
        num_contacts: nc,
        normals,
        basis,
        d,
        jp,
        jpdot,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
