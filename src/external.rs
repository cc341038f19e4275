//! Shared objects and their resolved procedure addresses.

use libloading::Library;
use log::debug;

use crate::errors::{JitError, Result};

/// Most procedures one library handle will hold.
pub const MAX_FUNCTIONS: usize = 32;

/// A loaded shared object plus an ordered table of resolved entry addresses,
/// ready to hand to [Assembler::call_external](crate::Assembler::call_external).
///
/// The addresses are only valid while the library stays open; dropping or
/// [close](ExternalLibrary::close)-ing it unloads the object.
#[derive(Debug)]
pub struct ExternalLibrary {
    library: Library,
    functions: Vec<*const ()>,
}

impl ExternalLibrary {
    /// Load a shared object by filesystem path, with lazy symbol resolution.
    pub fn open(path: &str) -> Result<Self> {
        let library =
            unsafe { Library::new(path) }.map_err(|e| JitError::LibraryOpen(e.to_string()))?;
        debug!("loaded {}", path);
        Ok(ExternalLibrary {
            library,
            functions: Vec::new(),
        })
    }

    /// Resolve `name`, append its address to the table, and return its index.
    pub fn resolve(&mut self, name: &str) -> Result<usize> {
        if self.functions.len() >= MAX_FUNCTIONS {
            return Err(JitError::ExternalTableFull);
        }

        let symbol: libloading::Symbol<unsafe extern "C" fn()> =
            unsafe { self.library.get(name.as_bytes()) }
                .map_err(|e| JitError::SymbolLookup(e.to_string()))?;
        let address = *symbol as *const ();
        debug!("resolved {} at {:p}", name, address);

        self.functions.push(address);
        Ok(self.functions.len() - 1)
    }

    /// Address of a previously resolved procedure.
    pub fn address_of(&self, index: usize) -> Option<*const ()> {
        self.functions.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Unload now instead of at drop. Emitted calls into this library must
    /// not run afterwards.
    pub fn close(self) {}
}
