/*
 * package.rs
 *
 * Package registry. Ids are slots in a vector: lowest free slot wins, slot 0
 * belongs to the built-in package and is only filled by init. A removed
 * package leaves a hole that the next register() reuses.
 *
 * Each package carries its own memory balance. Allocation under an id that
 * is not registered (including NONE) lands in a shared anonymous bucket so
 * that allocation works before init.
 */

use core::fmt;
use std::sync::Arc;

use crate::error::{Result, ScError};
use crate::log::LogHandler;
use crate::priority::{Category, LogThreshold, Priority};
use crate::runtime::Runtime;

/// Package identifier. Non-negative while registered; `NONE` is anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId(i32);

impl PackageId {
    /// no package, caller-anonymous
    pub const NONE: Self = Self(-1);
    /// the runtime's own built-in package
    pub const SC: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0
    }

    fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outstanding allocations. Signed so that releasing under the wrong
/// package shows up as a negative balance instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balance {
    pub bytes: i64,
    pub objects: i64,
}

impl Balance {
    pub const ZERO: Self = Self {
        bytes: 0,
        objects: 0,
    };

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.bytes == 0 && self.objects == 0
    }
}

pub struct Package {
    id: PackageId,
    name: String,
    full_name: String,
    log_handler: Option<Arc<dyn LogHandler>>,
    log_threshold: LogThreshold,
    balance: Balance,
}

impl Package {
    pub fn id(&self) -> PackageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn log_handler(&self) -> Option<&Arc<dyn LogHandler>> {
        self.log_handler.as_ref()
    }

    pub fn log_threshold(&self) -> LogThreshold {
        self.log_threshold
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }
}

#[derive(Default)]
pub struct Registry {
    slots: Vec<Option<Package>>,
    anonymous: Balance,
}

impl Registry {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            anonymous: Balance::ZERO,
        }
    }

    /// Register under the lowest free id >= 1.
    pub fn register(
        &mut self,
        log_handler: Option<Arc<dyn LogHandler>>,
        log_threshold: LogThreshold,
        name: &str,
        full_name: &str,
    ) -> Result<PackageId> {
        self.check_name(name)?;
        let index = self
            .slots
            .iter()
            .skip(1)
            .position(Option::is_none)
            .map_or(self.slots.len().max(1), |free| free + 1);
        Ok(self.place(index, log_handler, log_threshold, name, full_name))
    }

    /// Register the built-in package in the reserved slot 0.
    pub fn register_builtin(
        &mut self,
        log_handler: Option<Arc<dyn LogHandler>>,
        log_threshold: LogThreshold,
        name: &str,
        full_name: &str,
    ) -> Result<PackageId> {
        if self.is_registered(PackageId::SC) {
            return Err(ScError::ReservedPackage);
        }
        self.check_name(name)?;
        Ok(self.place(0, log_handler, log_threshold, name, full_name))
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if self.iter().any(|p| p.name == name) {
            return Err(ScError::DuplicatePackage(name.to_owned()));
        }
        Ok(())
    }

    fn place(
        &mut self,
        index: usize,
        log_handler: Option<Arc<dyn LogHandler>>,
        log_threshold: LogThreshold,
        name: &str,
        full_name: &str,
    ) -> PackageId {
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        /* slot count is bounded by live packages, nowhere near i32::MAX */
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let id = PackageId(index as i32);
        self.slots[index] = Some(Package {
            id,
            name: name.to_owned(),
            full_name: full_name.to_owned(),
            log_handler,
            log_threshold,
            balance: Balance::ZERO,
        });
        id
    }

    pub fn is_registered(&self, id: PackageId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: PackageId) -> Option<&Package> {
        id.index()
            .and_then(|i| self.slots.get(i))
            .and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: PackageId) -> Option<&mut Package> {
        id.index()
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::as_mut)
    }

    pub fn remove(&mut self, id: PackageId) -> Result<Package> {
        let package = id
            .index()
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::take)
            .ok_or(ScError::NotRegistered(id))?;
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        Ok(package)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.slots.iter().flatten()
    }

    /// Registered ids in ascending order.
    pub fn ids(&self) -> Vec<PackageId> {
        self.iter().map(Package::id).collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Balance of a registered package, or of the anonymous bucket.
    pub fn balance(&self, id: PackageId) -> Balance {
        self.get(id).map_or(self.anonymous, Package::balance)
    }

    pub(crate) fn balance_mut(&mut self, id: PackageId) -> &mut Balance {
        match id
            .index()
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::as_mut)
        {
            Some(package) => &mut package.balance,
            None => &mut self.anonymous,
        }
    }
}

impl Runtime {
    /// Register a package. A duplicate name is fatal.
    #[track_caller]
    pub fn register(
        &mut self,
        log_handler: Option<Arc<dyn LogHandler>>,
        log_threshold: LogThreshold,
        name: &str,
        full_name: &str,
    ) -> PackageId {
        match self
            .registry
            .register(log_handler, log_threshold, name, full_name)
        {
            Ok(id) => id,
            Err(e) => self.fatal(format_args!("{e}")),
        }
    }

    pub fn is_registered(&self, id: PackageId) -> bool {
        self.registry.is_registered(id)
    }

    /// Unregister a package after checking its memory balance. A leak is
    /// logged, not fatal; an unknown id is fatal.
    #[track_caller]
    pub fn unregister(&mut self, id: PackageId) {
        if let Err(e) = self.try_unregister(id) {
            self.fatal(format_args!("{e}"));
        }
    }

    pub(crate) fn try_unregister(&mut self, id: PackageId) -> Result<()> {
        if !self.registry.is_registered(id) {
            return Err(ScError::NotRegistered(id));
        }
        self.check_balance(id);
        self.registry.remove(id).map(drop)
    }

    pub fn package(&self, id: PackageId) -> Option<&Package> {
        self.registry.get(id)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Change the threshold of a registered package. Unknown ids are fatal.
    #[track_caller]
    pub fn set_package_log_threshold(&mut self, id: PackageId, threshold: LogThreshold) {
        if let Err(e) = self.try_set_package_log_threshold(id, threshold) {
            self.fatal(format_args!("{e}"));
        }
    }

    /// Change the handler of a registered package; `None` falls back to the
    /// global one. Unknown ids are fatal.
    #[track_caller]
    pub fn set_package_log_handler(&mut self, id: PackageId, handler: Option<Arc<dyn LogHandler>>) {
        if let Err(e) = self.try_set_package_log_handler(id, handler) {
            self.fatal(format_args!("{e}"));
        }
    }

    pub(crate) fn try_set_package_log_threshold(
        &mut self,
        id: PackageId,
        threshold: LogThreshold,
    ) -> Result<()> {
        let package = self.registry.get_mut(id).ok_or(ScError::NotRegistered(id))?;
        package.log_threshold = threshold;
        Ok(())
    }

    pub(crate) fn try_set_package_log_handler(
        &mut self,
        id: PackageId,
        handler: Option<Arc<dyn LogHandler>>,
    ) -> Result<()> {
        let package = self.registry.get_mut(id).ok_or(ScError::NotRegistered(id))?;
        package.log_handler = handler;
        Ok(())
    }

    /// One global-category line per registered package.
    pub fn print_summary(&mut self, priority: Priority) {
        let global = self.log_threshold();
        let lines: Vec<String> = self
            .registry
            .iter()
            .map(|p| {
                format!(
                    "{:>3}: {:<15} {:<10} {}",
                    p.id.as_raw(),
                    p.name,
                    p.log_threshold.resolve(global).name(),
                    p.full_name
                )
            })
            .collect();

        self.log(
            file!(),
            line!(),
            PackageId::SC,
            Category::Global,
            priority,
            format_args!("Package summary ({} total):", lines.len()),
        );
        for line in &lines {
            self.log(
                file!(),
                line!(),
                PackageId::SC,
                Category::Global,
                priority,
                format_args!("{line}"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(reg: &mut Registry, name: &str) -> PackageId {
        reg.register(None, LogThreshold::Default, name, "test package")
            .expect("register should succeed")
    }

    #[test]
    fn test_first_id_skips_reserved_slot() {
        let mut reg = Registry::new();
        assert_eq!(register(&mut reg, "a"), PackageId::from_raw(1));
        assert_eq!(register(&mut reg, "b"), PackageId::from_raw(2));
        assert!(!reg.is_registered(PackageId::SC));
    }

    #[test]
    fn test_lowest_free_id_is_reused() {
        let mut reg = Registry::new();
        let a = register(&mut reg, "a");
        let b = register(&mut reg, "b");
        let _c = register(&mut reg, "c");
        reg.remove(a).unwrap();
        reg.remove(b).unwrap();
        assert_eq!(register(&mut reg, "d"), a);
        assert_eq!(register(&mut reg, "e"), b);
    }

    #[test]
    fn test_builtin_takes_slot_zero_once() {
        let mut reg = Registry::new();
        let id = reg
            .register_builtin(None, LogThreshold::Default, "sc", "builtin")
            .unwrap();
        assert_eq!(id, PackageId::SC);
        assert_eq!(
            reg.register_builtin(None, LogThreshold::Default, "sc2", "again"),
            Err(ScError::ReservedPackage)
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut reg = Registry::new();
        register(&mut reg, "dup");
        let err = reg
            .register(None, LogThreshold::Default, "dup", "again")
            .err()
            .unwrap();
        assert_eq!(err, ScError::DuplicatePackage("dup".to_string()));
    }

    #[test]
    fn test_remove_unknown() {
        let mut reg = Registry::new();
        let id = PackageId::from_raw(5);
        assert!(matches!(reg.remove(id), Err(ScError::NotRegistered(x)) if x == id));
        assert!(matches!(
            reg.remove(PackageId::NONE),
            Err(ScError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_anonymous_bucket() {
        let mut reg = Registry::new();
        reg.balance_mut(PackageId::NONE).objects += 1;
        reg.balance_mut(PackageId::from_raw(9)).objects += 1;
        assert_eq!(reg.balance(PackageId::NONE).objects, 2);

        let id = register(&mut reg, "own");
        reg.balance_mut(id).bytes += 10;
        assert_eq!(reg.balance(id).bytes, 10);
        assert_eq!(reg.balance(PackageId::NONE).bytes, 0);
    }

    #[test]
    fn test_setters_reject_unknown_ids() {
        let mut rt = Runtime::new();
        let unknown = PackageId::from_raw(3);
        assert_eq!(
            rt.try_set_package_log_threshold(unknown, LogThreshold::Default),
            Err(ScError::NotRegistered(unknown))
        );
        assert_eq!(
            rt.try_set_package_log_handler(unknown, None),
            Err(ScError::NotRegistered(unknown))
        );
        assert_eq!(rt.try_unregister(unknown), Err(ScError::NotRegistered(unknown)));
    }

    #[test]
    fn test_set_package_log_threshold() {
        let mut rt = Runtime::new();
        let id = rt.register(None, LogThreshold::Default, "tuned", "tuned package");
        rt.set_package_log_threshold(id, LogThreshold::Explicit(Priority::Trace));
        assert_eq!(
            rt.package(id).map(Package::log_threshold),
            Some(LogThreshold::Explicit(Priority::Trace))
        );
    }

    #[test]
    fn test_len_and_ids() {
        let mut reg = Registry::new();
        assert!(reg.is_empty());
        let a = register(&mut reg, "a");
        let b = register(&mut reg, "b");
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.ids(), vec![a, b]);
    }
}
