//! A registry of installed tables. Serialized Definition Blocks are handed to the registry, which keeps its own
//! copy of each and gives back a [`TableKey`] that can later be used to look the table up or uninstall it.
//!
//! The registry is global, and must be brought up with [`init`] before anything is installed. [`teardown`] frees
//! every table, after which the registry can be initialized again.

use crate::{
    node::{AmlTree, NodeId},
    sdt::{validate_table_checksum, SdtHeader},
    AmlError,
    AmlResult,
};
use alloc::{collections::BTreeMap, vec::Vec};
use log::{error, info, trace};
use spinning_top::{const_spinlock, Spinlock};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TableKey(u32);

impl TableKey {
    pub fn value(self) -> u32 {
        self.0
    }
}

struct Registry {
    tables: BTreeMap<TableKey, Vec<u8>>,
    next_key: u32,
}

static REGISTRY: Spinlock<Option<Registry>> = const_spinlock(None);

fn with_registry<R>(f: impl FnOnce(&mut Registry) -> AmlResult<R>) -> AmlResult<R> {
    match REGISTRY.lock().as_mut() {
        Some(registry) => f(registry),
        None => {
            error!("The table registry hasn't been initialized");
            Err(AmlError::RegistryNotInitialized)
        }
    }
}

pub fn init() -> AmlResult<()> {
    let mut registry = REGISTRY.lock();
    if registry.is_some() {
        return Err(AmlError::RegistryAlreadyInitialized);
    }

    *registry = Some(Registry { tables: BTreeMap::new(), next_key: 1 });
    Ok(())
}

/// Uninstall every table, and tear the registry down.
pub fn teardown() -> AmlResult<()> {
    match REGISTRY.lock().take() {
        Some(registry) => {
            if !registry.tables.is_empty() {
                info!("Tearing down table registry with {} tables still installed", registry.tables.len());
            }
            Ok(())
        }
        None => Err(AmlError::RegistryNotInitialized),
    }
}

/// Install a copy of `table`, which must be a complete table (header included) with a valid checksum.
pub fn install(table: &[u8]) -> AmlResult<TableKey> {
    let header = SdtHeader::from_bytes(table)?;
    if header.length as usize != table.len() {
        error!("Table header says the table is {} bytes, but {} bytes were given", header.length, table.len());
        return Err(AmlError::InvalidTableLength { header: header.length, buffer: table.len() });
    }
    validate_table_checksum(table)?;
    let copy = copy_table(table)?;

    with_registry(|registry| {
        let key = TableKey(registry.next_key);
        registry.next_key = registry.next_key.checked_add(1).ok_or(AmlError::OutOfResources)?;
        registry.tables.insert(key, copy);
        trace!("Installed {} as table {}", header.signature, key.0);
        Ok(key)
    })
}

/// Serialize the Definition Block rooted at `root`, and install it.
pub fn install_definition_block(tree: &mut AmlTree, root: NodeId) -> AmlResult<TableKey> {
    let table = tree.serialize_definition_block(root)?;
    install(&table)
}

pub fn uninstall(key: TableKey) -> AmlResult<()> {
    with_registry(|registry| match registry.tables.remove(&key) {
        Some(_) => Ok(()),
        None => Err(AmlError::TableKeyDoesNotExist(key.0)),
    })
}

/// Call `f` with the bytes of an installed table. `f` is given a copy, and is called once the registry has been
/// unlocked again, so it can itself use the registry.
pub fn with_table<R>(key: TableKey, f: impl FnOnce(&[u8]) -> R) -> AmlResult<R> {
    let table = with_registry(|registry| match registry.tables.get(&key) {
        Some(table) => copy_table(table),
        None => Err(AmlError::TableKeyDoesNotExist(key.0)),
    })?;
    Ok(f(&table))
}

fn copy_table(table: &[u8]) -> AmlResult<Vec<u8>> {
    let mut copy = Vec::new();
    copy.try_reserve_exact(table.len()).map_err(|_| AmlError::OutOfResources)?;
    copy.extend_from_slice(table);
    Ok(copy)
}

pub fn installed_count() -> AmlResult<usize> {
    with_registry(|registry| Ok(registry.tables.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codegen, test_utils::*, Status};

    /*
     * The registry is global, so everything that touches it is in this one test, to stop tests running in
     * parallel from seeing each other's tables.
     */
    #[test]
    fn registry_lifecycle() {
        assert_eq!(install(FIXTURE_SSDT), Err(AmlError::RegistryNotInitialized));
        assert_eq!(teardown(), Err(AmlError::RegistryNotInitialized));

        init().unwrap();
        assert_eq!(init(), Err(AmlError::RegistryAlreadyInitialized));
        assert_eq!(installed_count(), Ok(0));

        let fixture = install(FIXTURE_SSDT).unwrap();
        assert_eq!(with_table(fixture, |table| table.to_vec()), Ok(FIXTURE_SSDT.to_vec()));

        // Installing doesn't forget the tables that are already there
        let mut tree = AmlTree::new();
        let root = codegen::code_gen_definition_block(&mut tree, *b"SSDT", 2, "RUSTOS", "GENERATD", 1).unwrap();
        codegen::code_gen_name_integer(&mut tree, "VAL0", 0x1234, Some(root)).unwrap();
        let generated = install_definition_block(&mut tree, root).unwrap();
        assert_ne!(fixture, generated);
        assert_eq!(installed_count(), Ok(2));
        assert_eq!(with_table(generated, |table| table.len()), Ok(44));
        assert_eq!(with_table(fixture, |table| table.len()), Ok(FIXTURE_SSDT.len()));
        assert_eq!(with_table(fixture, |_| installed_count()), Ok(Ok(2)));

        // Bad tables
        let mut corrupted = FIXTURE_SSDT.to_vec();
        corrupted[40] ^= 0xff;
        assert_eq!(install(&corrupted), Err(AmlError::InvalidChecksum));
        assert_eq!(
            install(&FIXTURE_SSDT[..100]),
            Err(AmlError::InvalidTableLength { header: FIXTURE_SSDT.len() as u32, buffer: 100 })
        );
        assert_eq!(installed_count(), Ok(2));

        uninstall(fixture).unwrap();
        let err = uninstall(fixture).unwrap_err();
        assert_eq!(err, AmlError::TableKeyDoesNotExist(fixture.value()));
        assert_eq!(err.status(), Status::NotFound);
        assert_eq!(with_table(fixture, |_| ()), Err(AmlError::TableKeyDoesNotExist(fixture.value())));
        assert_eq!(installed_count(), Ok(1));

        teardown().unwrap();
        assert_eq!(installed_count(), Err(AmlError::RegistryNotInitialized));

        // And it can be brought up again
        init().unwrap();
        assert_eq!(installed_count(), Ok(0));
        teardown().unwrap();
    }
}
