//
// hooks.rs --- Pre/post-instruction hooks and bundled peripherals.
//
// Released under the "BSD3" license. See the file "LICENSE"
// for details.
//

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::emu::cpu::CPU;

/// A callback invoked around every instruction.
///
/// Hooks registered with [`CPU::add_pre_hook`] run after the opcode
/// fetch and before dispatch; hooks registered with
/// [`CPU::add_post_hook`] run after dispatch. Each receives the
/// processor and the instruction byte, runs synchronously on the
/// stepping thread, and must not block unboundedly.
///
/// Closures of the matching shape implement `Hook` directly:
///
/// ```
/// use m6502::emu::CPU;
///
/// let mut cpu = CPU::new();
/// cpu.add_post_hook(|cpu: &mut CPU, opcode: u8| {
///     cpu.mem.put(0x00FD, opcode);
/// });
/// ```
pub trait Hook: Send {
    fn execute(&mut self, cpu: &mut CPU, opcode: u8);
}

impl<F> Hook for F
where
    F: FnMut(&mut CPU, u8) + Send,
{
    fn execute(&mut self, cpu: &mut CPU, opcode: u8) {
        self(cpu, opcode)
    }
}

/// Peripheral that surfaces key presses as a memory-mapped byte.
///
/// Every invocation writes the latched key to the configured address
/// and clears the latch, so a program polling the location sees each
/// press exactly once and zero otherwise. The injector is a shared
/// handle: register one clone as a hook and keep another to feed keys
/// in from the outside.
#[derive(Clone)]
pub struct KeyInjector {
    address: u16,
    pending: Arc<Mutex<Option<u8>>>,
}

impl KeyInjector {
    /// A key injector at the conventional address `$00FF`.
    pub fn new() -> KeyInjector {
        KeyInjector::at(0x00FF)
    }

    /// A key injector writing to `address`.
    pub fn at(address: u16) -> KeyInjector {
        KeyInjector {
            address,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    /// Latch a key press for delivery on the next instruction.
    pub fn press(&self, key: u8) {
        *self.pending.lock() = Some(key);
    }
}

impl Default for KeyInjector {
    fn default() -> KeyInjector {
        KeyInjector::new()
    }
}

impl Hook for KeyInjector {
    fn execute(&mut self, cpu: &mut CPU, _opcode: u8) {
        let key = self.pending.lock().take().unwrap_or(0);
        cpu.mem.put(self.address, key);
    }
}

/// Peripheral that refreshes a memory location with a random byte on
/// every instruction, giving programs a cheap entropy source.
pub struct RandomInjector {
    address: u16,
    rng: StdRng,
}

impl RandomInjector {
    /// A random injector at the conventional address `$00FE`.
    pub fn new() -> RandomInjector {
        RandomInjector::at(0x00FE)
    }

    /// A random injector writing to `address`.
    pub fn at(address: u16) -> RandomInjector {
        RandomInjector {
            address,
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Default for RandomInjector {
    fn default() -> RandomInjector {
        RandomInjector::new()
    }
}

impl Hook for RandomInjector {
    fn execute(&mut self, cpu: &mut CPU, _opcode: u8) {
        let val: u8 = self.rng.random();
        cpu.mem.put(self.address, val);
    }
}
