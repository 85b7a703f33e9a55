//
// mod.rs --- M6502 emulator module.
//
// Released under the "BSD3" license. See the file "LICENSE"
// for details.
//

pub mod clock;
pub mod cpu;
pub mod error;
pub mod flags;
pub mod hooks;
pub mod mem;
pub mod regs;

pub use self::clock::Clock;
pub use self::cpu::CPU;
pub use self::error::{Error, Result};
pub use self::flags::Status;
pub use self::hooks::{Hook, KeyInjector, RandomInjector};
pub use self::mem::{Memory, Range, WatchId};
pub use self::regs::Regs;
