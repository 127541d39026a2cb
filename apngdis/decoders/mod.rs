pub mod chunk;
pub mod compositor;
pub mod disassembler;
pub mod inflate;
pub mod png;
pub mod scanline;
