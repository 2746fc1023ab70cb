//! Transaction resolution.
//!
//! Given the descriptors a user asked for, compute every descriptor that has
//! to be installed so that all requirements hold, in an order where each
//! package comes after the packages it requires.
//!
//! Requirements are processed from a worklist until nothing changes:
//!
//! - a requirement already met by a descriptor in the transaction is kept;
//! - a descriptor in the transaction that is too old is dropped so a newer
//!   one can be chosen, unless it is an ancestor of the requiring package;
//! - a requirement met by an installed or built-in package needs nothing;
//! - otherwise the first sufficient, unblocked candidate in archive priority
//!   order joins the transaction.
//!
//! Dependency cycles are not errors. When a cycle forces a choice the edge is
//! dropped, a warning is logged, and resolution carries on. The resulting
//! order may then violate that one edge.
//!
//! # Example
//!
//! ```
//! use parcel_core::descriptor::{PackageDescriptor, PackageKind, Requirement};
//! use parcel_core::hold::HoldPolicy;
//! use parcel_core::resolver::TransactionResolver;
//! use parcel_core::store::DescriptorStore;
//!
//! let v = |s: &str| s.parse().unwrap();
//! let foo = PackageDescriptor::new("foo", v("1.0"), PackageKind::Bundle)
//!     .unwrap()
//!     .with_requirements(vec![Requirement::new("bar", v("2.0"))]);
//! let bar = PackageDescriptor::new("bar", v("2.1"), PackageKind::Bundle).unwrap();
//!
//! let mut store = DescriptorStore::new("emacs", v("29.1"));
//! store.replace_available(vec![foo.clone(), bar], &[]);
//!
//! let holds = HoldPolicy::new();
//! let plan = TransactionResolver::new(&store, &holds)
//!     .compute_transaction(&[foo])
//!     .unwrap();
//! let names: Vec<String> = plan.iter().map(|d| d.full_name()).collect();
//! assert_eq!(names, ["bar-2.1", "foo-1.0"]);
//! ```

use std::collections::VecDeque;

use crate::descriptor::{PackageDescriptor, Requirement};
use crate::error::{BlockReason, UnsatisfiableError};
use crate::hold::HoldPolicy;
use crate::store::DescriptorStore;
use crate::version::Version;

/// A descriptor whose requirements still need processing.
struct Pending {
    desc: PackageDescriptor,
    /// Names from the requested root down to `desc`, inclusive.
    chain: Vec<String>,
}

/// Computes install transactions against one store snapshot.
pub struct TransactionResolver<'a> {
    store: &'a DescriptorStore,
    holds: &'a HoldPolicy,
}

impl<'a> TransactionResolver<'a> {
    pub fn new(store: &'a DescriptorStore, holds: &'a HoldPolicy) -> Self {
        Self { store, holds }
    }

    /// Every descriptor needed to install `requested`, dependencies first.
    ///
    /// Fails before anything is chosen for download when any requirement
    /// cannot be met; the store is never modified.
    pub fn compute_transaction(
        &self,
        requested: &[PackageDescriptor],
    ) -> Result<Vec<PackageDescriptor>, UnsatisfiableError> {
        let mut packages: Vec<PackageDescriptor> = Vec::with_capacity(requested.len());
        let mut worklist: VecDeque<Pending> = VecDeque::new();

        for desc in requested {
            if packages.iter().any(|p| p.name() == desc.name()) {
                tracing::debug!(package = %desc, "ignoring duplicate request");
                continue;
            }
            packages.push(desc.clone());
            worklist.push_back(Pending {
                desc: desc.clone(),
                chain: vec![desc.name().to_string()],
            });
        }

        while let Some(Pending { desc, chain }) = worklist.pop_front() {
            // Dropped for an upgrade after it was queued
            if !packages.iter().any(|p| p.same_identity(&desc)) {
                continue;
            }

            for req in desc.requirements() {
                if let Some(pos) = packages.iter().position(|p| p.name() == req.name) {
                    let existing = &packages[pos];
                    if existing.version() >= &req.min_version {
                        continue;
                    }
                    if chain.iter().any(|name| *name == req.name) {
                        tracing::warn!(
                            package = %desc,
                            requirement = %req,
                            chosen = %existing,
                            chain = %chain.join(" -> "),
                            "dependency cycle; keeping the version already chosen"
                        );
                        continue;
                    }
                    tracing::debug!(
                        package = %desc,
                        requirement = %req,
                        dropped = %existing,
                        "upgrading dependency already in the transaction"
                    );
                    packages.remove(pos);
                }

                if self.store.satisfied_locally(req) {
                    continue;
                }

                let winner = self.select_candidate(req)?;
                tracing::debug!(package = %desc, requirement = %req, chosen = %winner, "selected dependency");

                let mut next_chain = chain.clone();
                next_chain.push(winner.name().to_string());
                packages.push(winner.clone());
                worklist.push_back(Pending {
                    desc: winner.clone(),
                    chain: next_chain,
                });
            }
        }

        Ok(dependency_order(packages))
    }

    /// First sufficient, unblocked candidate in archive priority order.
    fn select_candidate(&self, req: &Requirement) -> Result<&'a PackageDescriptor, UnsatisfiableError> {
        let mut blocked: Option<BlockReason> = None;
        let mut too_old: Option<&Version> = None;

        for candidate in self.store.available(&req.name) {
            if candidate.version() < &req.min_version {
                if too_old.is_none_or(|best| candidate.version() > best) {
                    too_old = Some(candidate.version());
                }
                continue;
            }
            match self.holds.blocks(candidate) {
                Some(reason) => {
                    blocked.get_or_insert(reason);
                }
                None => return Ok(candidate),
            }
        }

        // Local copies count as the closest match for the diagnostic
        for local in self
            .store
            .installed(&req.name)
            .iter()
            .chain(self.store.builtin(&req.name))
        {
            if too_old.is_none_or(|best| local.version() > best) {
                too_old = Some(local.version());
            }
        }

        let cause = blocked
            .or_else(|| too_old.map(|best| BlockReason::TooOld { best: best.clone() }))
            .unwrap_or(BlockReason::Absent);
        Err(UnsatisfiableError {
            name: req.name.clone(),
            required: req.min_version.clone(),
            cause,
        })
    }
}

/// Repeatedly extract the earliest-discovered descriptor whose requirements
/// within the set have all been extracted.
///
/// When no descriptor is ready the set contains a cycle; the earliest one is
/// extracted anyway.
pub fn dependency_order(packages: Vec<PackageDescriptor>) -> Vec<PackageDescriptor> {
    let mut remaining = packages;
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let ready = remaining.iter().position(|desc| {
            desc.requirements().iter().all(|req| {
                req.name == desc.name() || !remaining.iter().any(|other| other.name() == req.name)
            })
        });
        let idx = ready.unwrap_or_else(|| {
            let stuck: Vec<String> = remaining.iter().map(PackageDescriptor::full_name).collect();
            tracing::warn!(packages = %stuck.join(", "), "dependency cycle; breaking it at {}", stuck[0]);
            0
        });
        ordered.push(remaining.remove(idx));
    }
    ordered
}
