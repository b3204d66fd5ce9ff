// VMProbe - QEMU Monitor Introspection Client
// Copyright (C) 2026 VMProbe Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;
use std::fmt;

use crate::ParseError;

/// Execution mode of the dumped guest, inferred from which register names
/// appear in the monitor text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86,
    X64,
}

/// One guest register dump.
///
/// Every field is a u64 regardless of mode: a 32-bit dump leaves the upper
/// halves (and R8-R15) at zero, and segment selectors and CPL are widened
/// so a single extraction routine covers the whole set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterSet {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub rflags: u64,
    pub efer: u64,
    pub es: u64,
    pub cs: u64,
    pub ss: u64,
    pub ds: u64,
    pub fs: u64,
    pub gs: u64,
    pub cpl: u64,
    pub cr0: u64,
    pub cr2: u64,
    pub cr3: u64,
    pub cr4: u64,
    pub arch: Arch,
}

type FieldMut = fn(&mut RegisterSet) -> &mut u64;

/// Extraction order, with the label each field carries in either mode.
/// Entries without a 32-bit label do not exist in 32-bit dumps and are
/// skipped there.
const FIELDS: [(&str, Option<&str>, FieldMut); 30] = [
    ("RAX", Some("EAX"), |r: &mut RegisterSet| &mut r.rax),
    ("RBX", Some("EBX"), |r: &mut RegisterSet| &mut r.rbx),
    ("RCX", Some("ECX"), |r: &mut RegisterSet| &mut r.rcx),
    ("RDX", Some("EDX"), |r: &mut RegisterSet| &mut r.rdx),
    ("RSI", Some("ESI"), |r: &mut RegisterSet| &mut r.rsi),
    ("RDI", Some("EDI"), |r: &mut RegisterSet| &mut r.rdi),
    ("RBP", Some("EBP"), |r: &mut RegisterSet| &mut r.rbp),
    ("RSP", Some("ESP"), |r: &mut RegisterSet| &mut r.rsp),
    ("RIP", Some("EIP"), |r: &mut RegisterSet| &mut r.rip),
    ("R8", None, |r: &mut RegisterSet| &mut r.r8),
    ("R9", None, |r: &mut RegisterSet| &mut r.r9),
    ("R10", None, |r: &mut RegisterSet| &mut r.r10),
    ("R11", None, |r: &mut RegisterSet| &mut r.r11),
    ("R12", None, |r: &mut RegisterSet| &mut r.r12),
    ("R13", None, |r: &mut RegisterSet| &mut r.r13),
    ("R14", None, |r: &mut RegisterSet| &mut r.r14),
    ("R15", None, |r: &mut RegisterSet| &mut r.r15),
    ("CR0", Some("CR0"), |r: &mut RegisterSet| &mut r.cr0),
    ("CR2", Some("CR2"), |r: &mut RegisterSet| &mut r.cr2),
    ("CR3", Some("CR3"), |r: &mut RegisterSet| &mut r.cr3),
    ("CR4", Some("CR4"), |r: &mut RegisterSet| &mut r.cr4),
    ("ES", Some("ES"), |r: &mut RegisterSet| &mut r.es),
    ("CS", Some("CS"), |r: &mut RegisterSet| &mut r.cs),
    ("SS", Some("SS"), |r: &mut RegisterSet| &mut r.ss),
    ("DS", Some("DS"), |r: &mut RegisterSet| &mut r.ds),
    ("GS", Some("GS"), |r: &mut RegisterSet| &mut r.gs),
    ("FS", Some("FS"), |r: &mut RegisterSet| &mut r.fs),
    ("RFL", Some("EFL"), |r: &mut RegisterSet| &mut r.rflags),
    ("EFER", Some("EFER"), |r: &mut RegisterSet| &mut r.efer),
    ("CPL", Some("CPL"), |r: &mut RegisterSet| &mut r.cpl),
];

impl RegisterSet {
    /// Parse a register dump out of monitor reply text.
    ///
    /// Fails on the first label that is absent or whose value is not
    /// hexadecimal; no partial set is ever returned.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        // A 64-bit guest always dumps RAX; a 32-bit guest never does.
        let arch = if text.contains("RAX") {
            Arch::X64
        } else {
            Arch::X86
        };
        tracing::debug!(?arch, "parsing register dump");

        let mut regs = Self::zeroed(arch);
        for (label64, label32, field) in FIELDS {
            let label = match arch {
                Arch::X64 => Some(label64),
                Arch::X86 => label32,
            };
            let Some(label) = label else { continue };
            *field(&mut regs) = extract(text, label)?;
        }

        Ok(regs)
    }

    fn zeroed(arch: Arch) -> Self {
        Self {
            rax: 0,
            rbx: 0,
            rcx: 0,
            rdx: 0,
            rsi: 0,
            rdi: 0,
            rbp: 0,
            rsp: 0,
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rip: 0,
            rflags: 0,
            efer: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            cpl: 0,
            cr0: 0,
            cr2: 0,
            cr3: 0,
            cr4: 0,
            arch,
        }
    }
}

/// Locate the first occurrence of `label`, advance past the next `=`, and
/// parse what follows as hexadecimal. Each lookup is an independent
/// substring search; no ordering of the source text is assumed.
fn extract(text: &str, label: &'static str) -> Result<u64, ParseError> {
    let at = text
        .find(label)
        .ok_or(ParseError::MissingRegister(label))?;
    let rest = &text[at + label.len()..];
    let eq = rest.find('=').ok_or(ParseError::MalformedRegister(label))?;

    let value = rest[eq + 1..].trim_start();
    let value = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    let len = value
        .bytes()
        .take_while(u8::is_ascii_hexdigit)
        .count();
    if len == 0 {
        return Err(ParseError::MalformedRegister(label));
    }

    u64::from_str_radix(&value[..len], 16).map_err(|_| ParseError::MalformedRegister(label))
}

impl fmt::Display for RegisterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arch {
            Arch::X64 => {
                writeln!(
                    f,
                    "RAX=0x{:016x}, RBX=0x{:016x}, RCX=0x{:016x}, RDX=0x{:016x}",
                    self.rax, self.rbx, self.rcx, self.rdx
                )?;
                writeln!(
                    f,
                    "RSI=0x{:016x}, RDI=0x{:016x}, RBP=0x{:016x}, RSP=0x{:016x}",
                    self.rsi, self.rdi, self.rbp, self.rsp
                )?;
                writeln!(
                    f,
                    "R8=0x{:016x},  R9=0x{:016x},  R10=0x{:016x}, R11=0x{:016x}",
                    self.r8, self.r9, self.r10, self.r11
                )?;
                writeln!(
                    f,
                    "R12=0x{:016x}, R13=0x{:016x}, R14=0x{:016x}, R15=0x{:016x}",
                    self.r12, self.r13, self.r14, self.r15
                )?;
                writeln!(
                    f,
                    "RIP=0x{:016x}, RFL=0x{:016x}, CPL=0x{:016x}",
                    self.rip, self.rflags, self.cpl
                )?;
                writeln!(
                    f,
                    "ES=0x{:016x}, CS=0x{:016x}, SS=0x{:016x}, DS=0x{:016x}",
                    self.es, self.cs, self.ss, self.ds
                )?;
                writeln!(
                    f,
                    "GS=0x{:016x}, FS=0x{:016x}, EFER=0x{:016x}",
                    self.gs, self.fs, self.efer
                )?;
                writeln!(
                    f,
                    "CR0=0x{:016x}, CR2=0x{:016x}, CR3=0x{:016x}, CR4=0x{:016x}",
                    self.cr0, self.cr2, self.cr3, self.cr4
                )
            }
            Arch::X86 => {
                writeln!(
                    f,
                    "EAX=0x{:08x}, EBX=0x{:08x}, ECX=0x{:08x}, EDX=0x{:08x}",
                    self.rax, self.rbx, self.rcx, self.rdx
                )?;
                writeln!(
                    f,
                    "ESI=0x{:08x}, EDI=0x{:08x}, EBP=0x{:08x}, ESP=0x{:08x}",
                    self.rsi, self.rdi, self.rbp, self.rsp
                )?;
                writeln!(
                    f,
                    "EIP=0x{:08x}, EFL=0x{:08x}, CPL=0x{:08x}",
                    self.rip, self.rflags, self.cpl
                )?;
                writeln!(
                    f,
                    "ES=0x{:08x}, CS=0x{:08x}, SS=0x{:08x}, DS=0x{:08x}",
                    self.es, self.cs, self.ss, self.ds
                )?;
                writeln!(
                    f,
                    "GS=0x{:08x}, FS=0x{:08x}, EFER=0x{:08x}",
                    self.gs, self.fs, self.efer
                )?;
                writeln!(
                    f,
                    "CR0=0x{:08x}, CR2=0x{:08x}, CR3=0x{:08x}, CR4=0x{:08x}",
                    self.cr0, self.cr2, self.cr3, self.cr4
                )
            }
        }
    }
}
