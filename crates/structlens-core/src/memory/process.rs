use std::ffi::c_void;
use std::mem::size_of;

use tracing::{debug, info};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, PROCESSENTRY32W, Process32FirstW,
    Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Memory::{MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_NOACCESS, VirtualQueryEx};
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
    PROCESS_VM_WRITE,
};

use crate::error::{Error, Result};
use crate::memory::{ReadMemory, WriteMemory};

/// An open handle to the inspected process
pub struct ProcessHandle {
    handle: HANDLE,
    pub pid: u32,
    /// Load address of the main module
    pub base_address: u64,
    pub module_size: u32,
}

impl ProcessHandle {
    /// Open the first running process whose executable name matches
    /// `exe_name` (case-insensitive).
    pub fn find_by_name(exe_name: &str) -> Result<Self> {
        let pid = find_pid(exe_name)?.ok_or_else(|| Error::ProcessNotFound(exe_name.to_string()))?;
        Self::open(pid)
    }

    pub fn open(pid: u32) -> Result<Self> {
        let access =
            PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION;
        let handle = unsafe { OpenProcess(access, false, pid) }
            .map_err(|e| Error::ProcessOpenFailed(format!("pid {}: {}", pid, e)))?;

        let (base_address, module_size) = match main_module(pid) {
            Ok(module) => module,
            Err(e) => {
                unsafe {
                    let _ = CloseHandle(handle);
                }
                return Err(e);
            }
        };

        info!(
            "Attached to pid {} (base {:#x}, {} bytes)",
            pid, base_address, module_size
        );
        Ok(Self {
            handle,
            pid,
            base_address,
            module_size,
        })
    }

    /// Whether `address` lies in committed, accessible memory
    pub fn is_committed(&self, address: u64) -> bool {
        let mut info = MEMORY_BASIC_INFORMATION::default();
        let written = unsafe {
            VirtualQueryEx(
                self.handle,
                Some(address as *const c_void),
                &mut info,
                size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        written != 0 && info.State == MEM_COMMIT && info.Protect != PAGE_NOACCESS
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

/// Reads and writes through a [`ProcessHandle`]
pub struct MemoryReader<'a> {
    process: &'a ProcessHandle,
}

impl<'a> MemoryReader<'a> {
    pub fn new(process: &'a ProcessHandle) -> Self {
        Self { process }
    }

    pub fn base_address(&self) -> u64 {
        self.process.base_address
    }
}

impl ReadMemory for MemoryReader<'_> {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; size];
        let mut read = 0usize;
        unsafe {
            ReadProcessMemory(
                self.process.handle,
                address as *const c_void,
                buffer.as_mut_ptr() as *mut c_void,
                size,
                Some(&mut read),
            )
        }
        .map_err(|e| Error::read_failed(address, e.to_string()))?;

        if read != size {
            return Err(Error::read_failed(
                address,
                format!("partial read: {} of {} bytes", read, size),
            ));
        }
        Ok(buffer)
    }

    fn is_valid_pointer(&self, address: u64) -> bool {
        address != 0 && self.process.is_committed(address)
    }
}

impl WriteMemory for MemoryReader<'_> {
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        let mut written = 0usize;
        unsafe {
            WriteProcessMemory(
                self.process.handle,
                address as *const c_void,
                bytes.as_ptr() as *const c_void,
                bytes.len(),
                Some(&mut written),
            )
        }
        .map_err(|e| Error::MemoryWriteFailed {
            address,
            message: e.to_string(),
        })?;

        if written != bytes.len() {
            return Err(Error::MemoryWriteFailed {
                address,
                message: format!("partial write: {} of {} bytes", written, bytes.len()),
            });
        }
        Ok(())
    }
}

fn find_pid(exe_name: &str) -> Result<Option<u32>> {
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
        .map_err(|e| Error::ProcessOpenFailed(e.to_string()))?;

    let mut entry = PROCESSENTRY32W {
        dwSize: size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    let mut found = None;
    let mut more = unsafe { Process32FirstW(snapshot, &mut entry) }.is_ok();
    while more {
        let name = utf16_until_nul(&entry.szExeFile);
        if name.eq_ignore_ascii_case(exe_name) {
            found = Some(entry.th32ProcessID);
            break;
        }
        more = unsafe { Process32NextW(snapshot, &mut entry) }.is_ok();
    }

    unsafe {
        let _ = CloseHandle(snapshot);
    }
    debug!("Process lookup for {}: {:?}", exe_name, found);
    Ok(found)
}

fn main_module(pid: u32) -> Result<(u64, u32)> {
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }
        .map_err(|e| Error::ProcessOpenFailed(format!("module snapshot: {}", e)))?;

    let mut entry = MODULEENTRY32W {
        dwSize: size_of::<MODULEENTRY32W>() as u32,
        ..Default::default()
    };
    let result = unsafe { Module32FirstW(snapshot, &mut entry) }
        .map(|_| (entry.modBaseAddr as u64, entry.modBaseSize))
        .map_err(|e| Error::ProcessOpenFailed(format!("main module: {}", e)));

    unsafe {
        let _ = CloseHandle(snapshot);
    }
    result
}

fn utf16_until_nul(buffer: &[u16]) -> String {
    let end = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..end])
}
