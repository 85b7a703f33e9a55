//
// lib.rs --- M6502 core library.
//
// Released under the "BSD3" license. See the file "LICENSE"
// for details.
//

pub mod emu;
