//! The stack-machine micro-op contract the front-end lowers against.
//!
//! Every statement and expression in `front::ast` emits itself by calling
//! these methods rather than building a second IR; the back end is free to
//! interpret each call however its target requires.

use crate::common::Result;

/// A named jump target. Labels compare by name; creating one does not mark
/// it — `Emitter::mark_label` does that at whatever offset is current when
/// it's called.
#[derive(Debug, Clone)]
pub struct Label {
    name: String,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The abstract stack-machine operations a callable's body lowers against.
pub trait Emitter {
    fn emit_raw(&mut self, operation: &str, operands: &[String]) -> Result<()>;
    fn comment(&mut self, text: &str) -> Result<()>;

    fn push(&mut self, immediate: i64) -> Result<()>;
    fn pop(&mut self) -> Result<()>;

    fn add(&mut self) -> Result<()>;
    fn sub(&mut self) -> Result<()>;
    fn mul_s(&mut self) -> Result<()>;
    fn mul_u(&mut self) -> Result<()>;
    fn div_s(&mut self) -> Result<()>;
    fn div_u(&mut self) -> Result<()>;
    fn rem_s(&mut self) -> Result<()>;
    fn rem_u(&mut self) -> Result<()>;
    fn bit_not(&mut self) -> Result<()>;
    fn bit_and(&mut self) -> Result<()>;
    fn bit_or(&mut self) -> Result<()>;
    fn bit_xor(&mut self) -> Result<()>;
    fn lsh(&mut self) -> Result<()>;
    fn rsh(&mut self) -> Result<()>;

    fn cmp_eq(&mut self) -> Result<()>;
    fn cmp_ne(&mut self) -> Result<()>;
    fn cmp_lt_s(&mut self) -> Result<()>;
    fn cmp_lt_u(&mut self) -> Result<()>;
    fn cmp_gt_s(&mut self) -> Result<()>;
    fn cmp_gt_u(&mut self) -> Result<()>;
    fn cmp_le_s(&mut self) -> Result<()>;
    fn cmp_le_u(&mut self) -> Result<()>;
    fn cmp_ge_s(&mut self) -> Result<()>;
    fn cmp_ge_u(&mut self) -> Result<()>;

    fn call(&mut self, target: &str) -> Result<()>;
    fn ret(&mut self) -> Result<()>;
    fn jmp(&mut self, target: &str) -> Result<()>;
    fn br_t(&mut self, target: &str) -> Result<()>;
    fn br_f(&mut self, target: &str) -> Result<()>;
    fn br_eq(&mut self, target: &str) -> Result<()>;
    fn br_ne(&mut self, target: &str) -> Result<()>;
    fn br_lt_s(&mut self, target: &str) -> Result<()>;
    fn br_lt_u(&mut self, target: &str) -> Result<()>;
    fn br_gt_s(&mut self, target: &str) -> Result<()>;
    fn br_gt_u(&mut self, target: &str) -> Result<()>;
    fn br_le_s(&mut self, target: &str) -> Result<()>;
    fn br_le_u(&mut self, target: &str) -> Result<()>;
    fn br_ge_s(&mut self, target: &str) -> Result<()>;
    fn br_ge_u(&mut self, target: &str) -> Result<()>;

    fn add_sp(&mut self, offset: usize) -> Result<()>;
    fn rem_sp(&mut self, offset: usize) -> Result<()>;
    fn ld_sp(&mut self) -> Result<()>;
    fn st_sp(&mut self) -> Result<()>;
    fn ld_bp(&mut self) -> Result<()>;
    fn st_bp(&mut self) -> Result<()>;

    fn ld_global(&mut self, index: usize) -> Result<()>;
    fn st_global(&mut self, index: usize) -> Result<()>;
    fn ld_ptr(&mut self, size: usize) -> Result<()>;
    fn st_ptr(&mut self, size: usize) -> Result<()>;

    fn get_current_offset(&self) -> usize;
    fn create_label(&mut self, name: &str) -> Label {
        Label::new(name)
    }
    fn mark_label(&mut self, label: &Label) -> Result<()>;
}
