//! Stackful fibers over POSIX `ucontext`
//!
//! A `Fiber` is a saved machine context. Task fibers are created with
//! `with_stack` and start executing their entry on the first switch-in;
//! scheduler fibers are created with `adopt` and act as a save slot for the
//! worker thread's own context.

use crate::stack::FiberStack;
use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::io;
use std::mem::{self, MaybeUninit};
use std::ptr;

/// Entry point invoked on a fiber's first switch-in.
///
/// The entry must never return: the last thing it does is switch away to
/// another fiber.
pub type FiberEntry = extern "C" fn(*mut c_void);

/// A stackful coroutine context.
///
/// Switching is explicit and cooperative; there is no preemption. The caller
/// is responsible for keeping the backing stack alive for as long as the
/// fiber can run.
pub struct Fiber {
    ctx: UnsafeCell<libc::ucontext_t>,
}

// A fiber context is only ever read or written by the thread currently
// switching into or out of it; the engine serializes that access.
unsafe impl Send for Fiber {}
unsafe impl Sync for Fiber {}

impl Fiber {
    /// Create an empty context that will be filled when the owning thread
    /// first switches away from it.
    pub fn adopt() -> Self {
        Self {
            ctx: UnsafeCell::new(unsafe { MaybeUninit::zeroed().assume_init() }),
        }
    }

    /// Create a fiber that runs `entry(arg)` on `stack` at first switch-in.
    pub fn with_stack(stack: &FiberStack, entry: FiberEntry, arg: *mut c_void) -> io::Result<Self> {
        let fiber = Self::adopt();
        unsafe {
            let ctx = fiber.ctx.get();
            if libc::getcontext(ctx) != 0 {
                return Err(io::Error::last_os_error());
            }
            (*ctx).uc_stack.ss_sp = stack.bottom() as *mut c_void;
            (*ctx).uc_stack.ss_size = stack.size();
            (*ctx).uc_stack.ss_flags = 0;
            (*ctx).uc_link = ptr::null_mut();
            libc::sigemptyset(&mut (*ctx).uc_sigmask);

            // makecontext only forwards int-sized arguments, so the entry
            // pointer and its argument are each split across two of them.
            let entry_raw = entry as usize as u64;
            let arg_raw = arg as usize as u64;
            libc::makecontext(
                ctx,
                mem::transmute::<extern "C" fn(u32, u32, u32, u32), extern "C" fn()>(
                    fiber_trampoline,
                ),
                4,
                entry_raw as u32 as libc::c_int,
                (entry_raw >> 32) as u32 as libc::c_int,
                arg_raw as u32 as libc::c_int,
                (arg_raw >> 32) as u32 as libc::c_int,
            );
        }
        Ok(fiber)
    }

    /// Save the current machine context into `self` and resume `to`.
    ///
    /// # Safety
    ///
    /// The caller must be running on the fiber represented by `self`, `to`
    /// must hold a valid saved context (or a fresh `with_stack` context), and
    /// no other thread may touch either context for the duration of the
    /// switch.
    pub unsafe fn switch_to(&self, to: &Fiber) {
        libc::swapcontext(self.ctx.get(), to.ctx.get());
    }
}

extern "C" fn fiber_trampoline(entry_lo: u32, entry_hi: u32, arg_lo: u32, arg_hi: u32) {
    let entry: FiberEntry =
        unsafe { mem::transmute((((entry_hi as u64) << 32) | entry_lo as u64) as usize) };
    let arg = (((arg_hi as u64) << 32) | arg_lo as u64) as usize as *mut c_void;
    entry(arg);
    unreachable!("fiber entry returned");
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SwitchState {
        main: Fiber,
        task: Option<Fiber>,
        hits: u32,
    }

    extern "C" fn counting_entry(arg: *mut c_void) {
        let state = unsafe { &mut *(arg as *mut SwitchState) };
        loop {
            state.hits += 1;
            let task = state.task.as_ref().unwrap();
            unsafe { task.switch_to(&state.main) };
        }
    }

    #[test]
    fn test_fiber_switch_roundtrip() {
        let stack = FiberStack::new(64 * 1024).unwrap();
        let mut state = Box::new(SwitchState {
            main: Fiber::adopt(),
            task: None,
            hits: 0,
        });
        let arg = &mut *state as *mut SwitchState as *mut c_void;
        state.task = Some(Fiber::with_stack(&stack, counting_entry, arg).unwrap());

        assert_eq!(state.hits, 0);
        unsafe { state.main.switch_to(state.task.as_ref().unwrap()) };
        assert_eq!(state.hits, 1);
        unsafe { state.main.switch_to(state.task.as_ref().unwrap()) };
        assert_eq!(state.hits, 2);
    }

    #[test]
    fn test_fiber_preserves_stack_between_switches() {
        extern "C" fn summing_entry(arg: *mut c_void) {
            let state = unsafe { &mut *(arg as *mut SwitchState) };
            // locals on the fiber stack must survive each suspension
            let mut local = 0u32;
            loop {
                local += 10;
                state.hits = local;
                let task = state.task.as_ref().unwrap();
                unsafe { task.switch_to(&state.main) };
            }
        }

        let stack = FiberStack::new(64 * 1024).unwrap();
        let mut state = Box::new(SwitchState {
            main: Fiber::adopt(),
            task: None,
            hits: 0,
        });
        let arg = &mut *state as *mut SwitchState as *mut c_void;
        state.task = Some(Fiber::with_stack(&stack, summing_entry, arg).unwrap());

        for expected in [10, 20, 30] {
            unsafe { state.main.switch_to(state.task.as_ref().unwrap()) };
            assert_eq!(state.hits, expected);
        }
    }
}
