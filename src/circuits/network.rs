//! Equivalent impedance of series and parallel branch groups.

use crate::math::{admittance, is_finite, undefined, CScalar, C_ZERO};

use super::topology::Branch;

/// How a group of impedances is combined.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Impedances add.
    #[default]
    Series,
    /// Admittances add.
    Parallel,
}

/// A group of branch impedances sharing one connection style.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    connection: ConnectionKind,
    members: Vec<CScalar>,
}

impl Network {
    /// Creates an empty network.
    #[must_use]
    pub const fn new(connection: ConnectionKind) -> Self {
        Self {
            connection,
            members: Vec::new(),
        }
    }

    /// Collects the impedances of `branches`.
    #[must_use]
    pub fn of<'a>(connection: ConnectionKind, branches: impl IntoIterator<Item = &'a Branch>) -> Self {
        Self {
            connection,
            members: branches.into_iter().map(|b| b.impedance).collect(),
        }
    }

    /// Adds an impedance.
    pub fn push(&mut self, z: CScalar) {
        self.members.push(z);
    }

    /// Aggregate impedance.
    ///
    /// An open member makes a series group open; a shorted member makes a
    /// parallel group a short. An all-open parallel group is open.
    #[must_use]
    pub fn impedance(&self) -> CScalar {
        match self.connection {
            ConnectionKind::Series => {
                if self.members.iter().any(|z| !is_finite(*z)) {
                    return undefined();
                }
                self.members.iter().sum()
            }
            ConnectionKind::Parallel => {
                let mut total = C_ZERO;
                for z in &self.members {
                    if is_finite(*z) && z.norm() <= f64::EPSILON {
                        return C_ZERO;
                    }
                    total += admittance(*z).unwrap_or(C_ZERO);
                }
                admittance(total).unwrap_or_else(undefined)
            }
        }
    }

    /// Connection style.
    #[must_use]
    pub const fn connection_kind(&self) -> ConnectionKind {
        self.connection
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
