//! VM configuration.
//!
//! The structured, code-level equivalent of the CLI flags in §6:
//! the full parametric construction set (`char_bit`, `word_size`,
//! `addr_size`, per-space sizes, and aliasing directives).

use crate::memmap::SpaceName;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub char_bit: u32,
    pub word_size: usize,
    pub addr_size: usize,
    pub ram_size: usize,
    pub stack_size: usize,
    /// Requested size of the `program` space. The program image loaded at
    /// construction time (§3 "program image") may be larger; the space is
    /// then sized to the image's length, matching §4.3's "combined size is
    /// the larger of the requested sizes" rule for an aliased `program`.
    pub program_size: usize,
    pub aliases: Vec<(SpaceName, SpaceName)>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            char_bit: 9,
            word_size: 7,
            addr_size: 5,
            ram_size: 1024,
            stack_size: 256,
            program_size: 0,
            aliases: Vec::new(),
        }
    }
}

impl VmConfig {
    pub fn word_bits(&self) -> u32 {
        (self.word_size as u32) * self.char_bit
    }

    pub fn addr_bits(&self) -> u32 {
        (self.addr_size as u32) * self.char_bit
    }

    /// Parse one `--map-memory` directive term, e.g. `"ram=program"`.
    pub fn parse_alias(term: &str) -> Option<(SpaceName, SpaceName)> {
        let (lhs, rhs) = term.split_once('=')?;
        Some((SpaceName::parse(lhs.trim())?, SpaceName::parse(rhs.trim())?))
    }
}
