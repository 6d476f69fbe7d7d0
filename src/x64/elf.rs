//! Writing compiled functions into an ELF relocatable object.

use crate::baseline::CompiledCode;
use object::write::{Object, SectionId, StandardSection, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};
use thiserror::Error;

const CODE_ALIGN: u64 = 16;
const SAFEPOINT_SECTION: &[u8] = b".rodata.wasm_safepoints";

#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("object writing failed: {0}")]
    Write(#[from] object::write::Error),
}

/// Collects compiled functions as global text symbols.
pub struct ObjectBuilder {
    object: Object<'static>,
    safepoints: Option<SectionId>,
    functions: usize,
}

impl ObjectBuilder {
    pub fn new() -> Self {
        Self {
            object: Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little),
            safepoints: None,
            functions: 0,
        }
    }

    /// Add `code` under `name`. Its safepoint table goes to a separate
    /// read-only section under `name` suffixed with `$safepoints`.
    pub fn add_function(&mut self, name: &str, code: &CompiledCode) {
        let text = self.object.section_id(StandardSection::Text);
        let machine_code = code.machine_code();
        let offset = self.object.append_section_data(text, machine_code, CODE_ALIGN);
        self.object.add_symbol(Symbol {
            name: name.as_bytes().to_vec(),
            value: offset,
            size: machine_code.len() as u64,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });

        let table = &code.code[code.safepoint_table_offset..];
        let section = self.safepoint_section();
        let table_offset = self.object.append_section_data(section, table, 8);
        self.object.add_symbol(Symbol {
            name: format!("{name}$safepoints").into_bytes(),
            value: table_offset,
            size: table.len() as u64,
            kind: SymbolKind::Data,
            scope: SymbolScope::Compilation,
            weak: false,
            section: SymbolSection::Section(section),
            flags: SymbolFlags::None,
        });
        self.functions += 1;
    }

    fn safepoint_section(&mut self) -> SectionId {
        if let Some(id) = self.safepoints {
            return id;
        }
        let id = self.object.add_section(
            Vec::new(),
            SAFEPOINT_SECTION.to_vec(),
            SectionKind::ReadOnlyData,
        );
        self.safepoints = Some(id);
        id
    }

    pub fn function_count(&self) -> usize {
        self.functions
    }

    pub fn finish(self) -> Result<Vec<u8>, ObjectError> {
        Ok(self.object.write()?)
    }
}

impl Default for ObjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}
