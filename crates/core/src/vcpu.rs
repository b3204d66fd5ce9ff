// VMProbe - QEMU Monitor Introspection Client
// Copyright (C) 2026 VMProbe Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;
use std::fmt;

use crate::ParseError;

/// Marker that introduces each CPU record in the monitor text.
const CPU_MARKER: &str = "CPU";

/// Run state of one virtual CPU. A record without a parenthesized state
/// word is a running CPU; an unrecognized word is preserved as Undefined
/// rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VcpuState {
    Running,
    Halted,
    Undefined,
}

/// One virtual CPU: its monitor-assigned id, current program counter, and
/// run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vcpu {
    pub id: u8,
    pub pc: u64,
    pub state: VcpuState,
}

/// An ordered collection of VCPU records. Each newly parsed record is
/// prepended, so iteration order is the reverse of textual appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VcpuList {
    vcpus: Vec<Vcpu>,
}

impl VcpuList {
    /// Parse a CPU listing out of monitor reply text.
    ///
    /// Fails if the CPU marker never appears, or if any record is missing
    /// its id or program counter; accumulated records are discarded on
    /// failure.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let at = text.find(CPU_MARKER).ok_or(ParseError::MissingCpuList)?;

        let mut list = Self::default();
        for chunk in text[at..].split(CPU_MARKER) {
            if chunk.is_empty() {
                continue;
            }
            let vcpu = parse_entry(chunk)?;
            list.vcpus.insert(0, vcpu);
        }

        tracing::debug!(count = list.count(), "parsed CPU listing");
        Ok(list)
    }

    pub fn count(&self) -> usize {
        self.vcpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vcpus.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Vcpu> {
        self.vcpus.iter()
    }
}

impl<'a> IntoIterator for &'a VcpuList {
    type Item = &'a Vcpu;
    type IntoIter = std::slice::Iter<'a, Vcpu>;

    fn into_iter(self) -> Self::IntoIter {
        self.vcpus.iter()
    }
}

/// Parse one record chunk: ` #<id>: pc=0x<hex>` with an optional
/// ` (<state>)` suffix. Trailing fields (thread ids and the like) are
/// ignored.
fn parse_entry(chunk: &str) -> Result<Vcpu, ParseError> {
    let malformed = || ParseError::MalformedCpuEntry(chunk.trim().to_string());

    let rest = chunk.trim_start();
    let rest = rest.strip_prefix('#').ok_or_else(malformed)?;

    let id_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    let id: u8 = rest[..id_len].parse().map_err(|_| malformed())?;
    let rest = &rest[id_len..];

    let rest = rest.strip_prefix(':').ok_or_else(malformed)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix("pc=0x").ok_or_else(malformed)?;

    let pc_len = rest.bytes().take_while(u8::is_ascii_hexdigit).count();
    if pc_len == 0 {
        return Err(malformed());
    }
    let pc = u64::from_str_radix(&rest[..pc_len], 16).map_err(|_| malformed())?;
    let rest = &rest[pc_len..];

    let state = match rest.trim_start().strip_prefix('(') {
        Some(tail) => {
            let word_len = tail
                .bytes()
                .take_while(u8::is_ascii_lowercase)
                .count();
            match &tail[..word_len] {
                // An empty capture means no usable state word; the CPU is
                // treated as running, same as a record with no suffix.
                "" => VcpuState::Running,
                "halted" => VcpuState::Halted,
                _ => VcpuState::Undefined,
            }
        }
        None => VcpuState::Running,
    };

    Ok(Vcpu { id, pc, state })
}

impl fmt::Display for VcpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VcpuState::Running => "Running",
            VcpuState::Halted => "Halted",
            VcpuState::Undefined => "Undef",
        };
        f.write_str(label)
    }
}

impl fmt::Display for VcpuList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cpu in &self.vcpus {
            writeln!(f, "CPU#{}, PC=0x{:x}, State: {}", cpu.id, cpu.pc, cpu.state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "{\"return\": \"* CPU #0: pc=0xffffffff81051c02 (halted) thread_id=5132\r\n  CPU #1: pc=0xffffffff81051c03 thread_id=5133\r\n\"}";

    #[test]
    fn parses_two_cpus_in_reverse_order() {
        let list = VcpuList::parse(LISTING).unwrap();
        assert_eq!(list.count(), 2);

        let cpus: Vec<_> = list.iter().collect();
        assert_eq!(cpus[0].id, 1);
        assert_eq!(cpus[0].pc, 0xffffffff81051c03);
        assert_eq!(cpus[0].state, VcpuState::Running);
        assert_eq!(cpus[1].id, 0);
        assert_eq!(cpus[1].pc, 0xffffffff81051c02);
        assert_eq!(cpus[1].state, VcpuState::Halted);
    }

    #[test]
    fn unknown_state_word_is_undefined() {
        let list =
            VcpuList::parse("CPU #0: pc=0x1000 (sleeping) thread_id=1\r\n").unwrap();
        assert_eq!(list.iter().next().unwrap().state, VcpuState::Undefined);
    }

    #[test]
    fn missing_marker_fails() {
        let err = VcpuList::parse("{\"return\": \"\"}").unwrap_err();
        assert_eq!(err, ParseError::MissingCpuList);
    }

    #[test]
    fn bad_id_fails_whole_parse() {
        let err =
            VcpuList::parse("CPU #0: pc=0x1000\r\nCPU #x: pc=0x2000\r\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedCpuEntry(_)));
    }

    #[test]
    fn bad_pc_fails_whole_parse() {
        let err =
            VcpuList::parse("CPU #0: pc=0xzz thread_id=1\r\nCPU #1: pc=0x2000\r\n")
                .unwrap_err();
        assert!(matches!(err, ParseError::MalformedCpuEntry(_)));
    }

    #[test]
    fn id_overflow_fails() {
        let err = VcpuList::parse("CPU #300: pc=0x1000\r\n").unwrap_err();
        assert!(matches!(err, ParseError::MalformedCpuEntry(_)));
    }

    #[test]
    fn empty_parenthesis_means_running() {
        let list = VcpuList::parse("CPU #0: pc=0x1000 ()\r\n").unwrap();
        assert_eq!(list.iter().next().unwrap().state, VcpuState::Running);
    }

    #[test]
    fn serializes_to_json() {
        let list = VcpuList::parse(LISTING).unwrap();
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["vcpus"][0]["id"], 1);
        assert_eq!(json["vcpus"][0]["state"], "running");
        assert_eq!(json["vcpus"][1]["state"], "halted");
    }

    #[test]
    fn renders_one_line_per_cpu() {
        let list = VcpuList::parse(LISTING).unwrap();
        let text = list.to_string();
        assert!(text.contains("CPU#1, PC=0xffffffff81051c03, State: Running"));
        assert!(text.contains("CPU#0, PC=0xffffffff81051c02, State: Halted"));
    }
}
