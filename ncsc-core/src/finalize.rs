//! Preparation of a main-script instance for serialization.

use tracing::debug;

use crate::error::CoreError;
use crate::instance::CompilerInstance;

/// Size of each working region reserved by [`finalize_main_script`].
pub const TABLE_REGION_SIZE: usize = 256 * 1024;

/// Number of per-unit flag slots stamped from the caller's flag byte.
pub const FLAG_SLOTS: usize = 11;

/// Debug bit of the unit flag byte.
pub const FLAG_DEBUG: u8 = 0x01;

/// Working storage the serializer fills: the encoded globals loader and
/// the encoded function table, plus the per-unit flags.
#[derive(Debug)]
pub struct OutputTables {
    pub globals: Vec<u8>,
    pub functions: Vec<u8>,
    pub flags: [u8; FLAG_SLOTS],
}

impl OutputTables {
    pub fn debug_enabled(&self) -> bool {
        self.flags.iter().any(|flag| flag & FLAG_DEBUG != 0)
    }

    /// Empties both segments, keeping their reservations.
    pub fn reset(&mut self) {
        self.globals.clear();
        self.functions.clear();
    }
}

fn reserve_region(what: &'static str) -> Result<Vec<u8>, CoreError> {
    let mut region = Vec::new();
    region
        .try_reserve_exact(TABLE_REGION_SIZE)
        .map_err(|_| CoreError::out_of_memory(what, TABLE_REGION_SIZE))?;
    Ok(region)
}

/// Reserves the globals and function-table regions, resets them and
/// stamps every flag slot with `flags`. Runs once per main script.
pub fn finalize_main_script(instance: &mut CompilerInstance, flags: u8) -> Result<(), CoreError> {
    if instance.is_destroyed() {
        return Err(CoreError::InstanceDestroyed);
    }
    if instance.tables().is_some() {
        return Err(CoreError::AlreadyFinalized);
    }
    let mut tables = OutputTables {
        globals: reserve_region("globals table")?,
        functions: reserve_region("function table")?,
        flags: [flags; FLAG_SLOTS],
    };
    tables.reset();
    debug!(unit = instance.name(), flags, "finalized main script");
    instance.install_tables(tables);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::instance::IncludeScope;

    fn instance() -> CompilerInstance {
        CompilerInstance::create("main", Rc::from(&b"void main(){}"[..]), None, false, IncludeScope::private())
            .unwrap()
    }

    #[test]
    fn stamps_every_flag_slot() {
        let mut main = instance();
        finalize_main_script(&mut main, FLAG_DEBUG).unwrap();
        let tables = main.tables().unwrap();
        assert_eq!(tables.flags, [FLAG_DEBUG; FLAG_SLOTS]);
        assert!(tables.debug_enabled());
        assert!(tables.globals.is_empty());
        assert!(tables.functions.capacity() >= TABLE_REGION_SIZE);
    }

    #[test]
    fn runs_only_once() {
        let mut main = instance();
        finalize_main_script(&mut main, 0).unwrap();
        assert!(!main.tables().unwrap().debug_enabled());
        assert!(matches!(
            finalize_main_script(&mut main, 0),
            Err(CoreError::AlreadyFinalized)
        ));
    }

    #[test]
    fn refuses_destroyed_instances() {
        let mut main = instance();
        main.destroy();
        assert!(matches!(
            finalize_main_script(&mut main, 0),
            Err(CoreError::InstanceDestroyed)
        ));
    }
}
