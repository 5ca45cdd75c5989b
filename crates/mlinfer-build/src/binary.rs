//! Checks on the server binary bundled into images
//!
//! Images only run statically linked x86_64 Linux executables.

use mlinfer_core::{MlinferError, MlinferResult};

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const MACHO_MAGICS: [[u8; 4]; 2] = [[0xCF, 0xFA, 0xED, 0xFE], [0xFE, 0xED, 0xFA, 0xCF]];

const ELF_CLASS_64: u8 = 2;
const ELF_DATA_LSB: u8 = 1;
const EM_X86_64: u16 = 0x3E;
const PT_INTERP: u32 = 3;

const ELF64_HEADER_LEN: usize = 64;
const ELF64_PHDR_LEN: usize = 56;

/// Verify `data` is a statically linked x86_64 Linux executable
pub fn check_server_binary(data: &[u8]) -> MlinferResult<()> {
    if MACHO_MAGICS.iter().any(|magic| data.starts_with(magic)) {
        return Err(MlinferError::Build(
            "server binary is a macOS executable; build it for x86_64-unknown-linux-musl"
                .to_string(),
        ));
    }
    if !data.starts_with(&ELF_MAGIC) || data.len() < ELF64_HEADER_LEN {
        return Err(MlinferError::Build(
            "server binary is not a Linux executable".to_string(),
        ));
    }
    if data[4] != ELF_CLASS_64 || data[5] != ELF_DATA_LSB {
        return Err(MlinferError::Build(
            "server binary must be a 64-bit little-endian executable".to_string(),
        ));
    }

    let machine = read_u16(data, 0x12);
    if machine != EM_X86_64 {
        return Err(MlinferError::Build(format!(
            "server binary targets machine {:#x}, images need x86_64",
            machine
        )));
    }

    let phoff = usize::try_from(read_u64(data, 0x20)).unwrap_or(usize::MAX);
    let phentsize = usize::from(read_u16(data, 0x36));
    let phnum = usize::from(read_u16(data, 0x38));

    for index in 0..phnum {
        let offset = index
            .checked_mul(phentsize)
            .and_then(|relative| relative.checked_add(phoff))
            .filter(|start| {
                phentsize >= ELF64_PHDR_LEN
                    && start.checked_add(ELF64_PHDR_LEN).is_some_and(|end| end <= data.len())
            })
            .ok_or_else(|| {
                MlinferError::Build("server binary has a truncated program header".to_string())
            })?;

        if read_u32(data, offset) == PT_INTERP {
            return Err(MlinferError::Build(
                "server binary is dynamically linked; build it for x86_64-unknown-linux-musl"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Minimal ELF64 images for tests
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// An x86_64 executable with no program headers
    pub fn static_elf() -> Vec<u8> {
        elf(EM_X86_64, &[])
    }

    /// An x86_64 executable requesting a dynamic loader
    pub fn dynamic_elf() -> Vec<u8> {
        elf(EM_X86_64, &[PT_INTERP])
    }

    pub fn elf(machine: u16, segments: &[u32]) -> Vec<u8> {
        let mut data = vec![0u8; ELF64_HEADER_LEN];
        data[..4].copy_from_slice(&ELF_MAGIC);
        data[4] = ELF_CLASS_64;
        data[5] = ELF_DATA_LSB;
        data[0x12..0x14].copy_from_slice(&machine.to_le_bytes());
        data[0x20..0x28].copy_from_slice(&(ELF64_HEADER_LEN as u64).to_le_bytes());
        data[0x36..0x38].copy_from_slice(&(ELF64_PHDR_LEN as u16).to_le_bytes());
        data[0x38..0x3A].copy_from_slice(&(segments.len() as u16).to_le_bytes());

        for segment in segments {
            let mut phdr = vec![0u8; ELF64_PHDR_LEN];
            phdr[..4].copy_from_slice(&segment.to_le_bytes());
            data.extend_from_slice(&phdr);
        }
        data
    }
}
