//! General-purpose register file of an x86_64 tracee
//!
//! [`Registers`] mirrors `user_regs_struct` field for field, so it converts
//! losslessly in both directions and can also be built by hand in tests.
//! Registers can be addressed by name (case-insensitive), which is how the
//! CLI and the inspection checks refer to them.

use std::fmt;

macro_rules! registers {
    ($($name:ident),* $(,)?) => {
        /// Snapshot of the tracee's general-purpose registers
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct Registers {
            $(pub $name: u64,)*
        }

        impl Registers {
            /// Register names in `user_regs_struct` order
            pub const NAMES: &'static [&'static str] = &[$(stringify!($name)),*];

            /// Read a register by name
            pub fn get(&self, name: &str) -> Option<u64> {
                match name.to_ascii_lowercase().as_str() {
                    $(stringify!($name) => Some(self.$name),)*
                    _ => None,
                }
            }

            /// Write a register by name. Returns `false` for an unknown name.
            pub fn set(&mut self, name: &str, value: u64) -> bool {
                match name.to_ascii_lowercase().as_str() {
                    $(stringify!($name) => {
                        self.$name = value;
                        true
                    })*
                    _ => false,
                }
            }

            /// `(name, value)` pairs in `user_regs_struct` order
            pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> {
                [$((stringify!($name), self.$name)),*].into_iter()
            }
        }

        impl From<libc::user_regs_struct> for Registers {
            fn from(raw: libc::user_regs_struct) -> Self {
                Registers {
                    $($name: raw.$name,)*
                }
            }
        }

        impl From<Registers> for libc::user_regs_struct {
            fn from(regs: Registers) -> Self {
                // SAFETY: user_regs_struct is plain integers; all-zero is valid.
                let mut raw: libc::user_regs_struct = unsafe { std::mem::zeroed() };
                $(raw.$name = regs.$name;)*
                raw
            }
        }
    };
}

registers! {
    r15, r14, r13, r12, rbp, rbx, r11, r10, r9, r8, rax, rcx, rdx, rsi, rdi,
    orig_rax, rip, cs, eflags, rsp, ss, fs_base, gs_base, ds, es, fs, gs,
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{:<8} = 0x{:012X}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_access_is_case_insensitive() {
        let mut regs = Registers::default();
        assert!(regs.set("Rcx", 0x123));
        assert_eq!(regs.rcx, 0x123);
        assert_eq!(regs.get("rcx"), Some(0x123));
        assert_eq!(regs.get("RCX"), Some(0x123));
    }

    #[test]
    fn test_unknown_register() {
        let mut regs = Registers::default();
        assert_eq!(regs.get("xmm0"), None);
        assert!(!regs.set("xmm0", 1));
        assert_eq!(regs, Registers::default());
    }

    #[test]
    fn test_raw_conversion_preserves_every_field() {
        let mut regs = Registers::default();
        for (i, name) in Registers::NAMES.iter().enumerate() {
            regs.set(name, 0x1000 + i as u64);
        }
        let raw: libc::user_regs_struct = regs.into();
        assert_eq!(raw.rip, regs.rip);
        assert_eq!(raw.gs, regs.gs);
        assert_eq!(Registers::from(raw), regs);
    }

    #[test]
    fn test_dump_lists_all_registers() {
        let regs = Registers {
            rip: 0xABC,
            ..Registers::default()
        };
        let dump = regs.to_string();
        assert_eq!(dump.lines().count(), Registers::NAMES.len());
        assert!(dump.contains("rip      = 0x000000000ABC"));
    }
}
