//! The linked `liblsf`.
//!
//! Every function here touches process-wide library state; callers reach
//! it only through a [`Session`](super::Session), which serializes calls.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;
use std::sync::OnceLock;

use tracing::{debug, info};

use super::{NativeSurface, RawResult, Request, RequestKind};
use crate::decoder::{NativeAddr, NativeMemory, ProcessMemory};
use crate::error::{ErrorCode, NativeError};

#[link(name = "lsf")]
unsafe extern "C" {
    static lserrno: c_int;

    fn ls_initdebug(app_name: *const c_char) -> c_int;
    fn ls_sysmsg() -> *const c_char;

    fn ls_getclustername() -> *const c_char;
    fn ls_getmastername() -> *const c_char;
    fn ls_gethostinfo(
        resreq: *const c_char,
        numhosts: *mut c_int,
        hostlist: *mut *mut c_char,
        listsize: c_int,
        options: c_int,
    ) -> *mut c_void;
    fn ls_clusterinfo(
        resreq: *const c_char,
        numclusters: *mut c_int,
        clusterlist: *mut *mut c_char,
        listsize: c_int,
        options: c_int,
    ) -> *mut c_void;
    fn ls_load(
        resreq: *const c_char,
        numhosts: *mut c_int,
        options: c_int,
        fromhost: *const c_char,
    ) -> *mut c_void;
    fn ls_loadofhosts(
        resreq: *const c_char,
        numhosts: *mut c_int,
        options: c_int,
        fromhost: *const c_char,
        hostlist: *mut *mut c_char,
        listsize: c_int,
    ) -> *mut c_void;
    fn ls_info() -> *mut c_void;
    fn ls_indexnames(info: *mut c_void) -> *mut *mut c_char;
    fn ls_gethosttype(hostname: *const c_char) -> *const c_char;
    fn ls_gethostmodel(hostname: *const c_char) -> *const c_char;
    fn ls_gethostfactor(hostname: *const c_char) -> *mut f32;
    fn ls_placereq(
        resreq: *const c_char,
        numhosts: *mut c_int,
        options: c_int,
        fromhost: *const c_char,
    ) -> *mut *mut c_char;
    fn ls_sharedresourceinfo(
        resources: *mut *mut c_char,
        numresources: *mut c_int,
        hostname: *const c_char,
        options: c_int,
    ) -> *mut c_void;
    fn ls_readcluster(filename: *const c_char, info: *mut c_void) -> *mut c_void;
    fn ls_getconf(filename: *const c_char) -> *mut c_void;
    fn ls_freeconf(conf: *mut c_void);
    fn ls_getacctrec(fp: *mut libc::FILE, line_num: *mut c_int) -> *mut c_void;
}

static INIT: OnceLock<Result<(), NativeError>> = OnceLock::new();

fn last_error(call: &'static str) -> NativeError {
    // SAFETY: plain reads of library globals, serialized by the session lock.
    let code = unsafe { lserrno };
    let msg = unsafe { ls_sysmsg() };
    let message = if msg.is_null() {
        None
    } else {
        // SAFETY: ls_sysmsg returns a NUL terminated static buffer.
        Some(unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned())
    };
    NativeError { call, code: ErrorCode(code), message }
}

fn bad_argument(call: &'static str, what: &str) -> NativeError {
    NativeError {
        call,
        code: ErrorCode::BAD_ARGS,
        message: Some(format!("{what} contains a NUL byte")),
    }
}

fn cstring(call: &'static str, value: &str) -> Result<CString, NativeError> {
    CString::new(value).map_err(|_| bad_argument(call, value))
}

fn opt_cstring(call: &'static str, value: &Option<String>) -> Result<Option<CString>, NativeError> {
    value.as_deref().map(|v| cstring(call, v)).transpose()
}

fn opt_ptr(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |v| v.as_ptr())
}

/// A `char **` argument built from owned strings.
struct CStringList {
    _owned: Vec<CString>,
    ptrs: Vec<*mut c_char>,
}

impl CStringList {
    fn new(call: &'static str, values: &[String]) -> Result<Self, NativeError> {
        let owned = values
            .iter()
            .map(|v| cstring(call, v))
            .collect::<Result<Vec<_>, _>>()?;
        let ptrs = owned.iter().map(|c| c.as_ptr() as *mut c_char).collect();
        Ok(Self { _owned: owned, ptrs })
    }

    /// Null for an empty list, which the library reads as "all".
    fn as_mut_ptr(&mut self) -> *mut *mut c_char {
        if self.ptrs.is_empty() { ptr::null_mut() } else { self.ptrs.as_mut_ptr() }
    }

    fn len(&self) -> c_int {
        c_int::try_from(self.ptrs.len()).unwrap_or(c_int::MAX)
    }
}

/// An accounting file opened for `ls_getacctrec`.
struct AcctFile {
    path: String,
    fp: *mut libc::FILE,
    line: c_int,
}

// SAFETY: the FILE is only used under the session lock.
unsafe impl Send for AcctFile {}

impl AcctFile {
    fn open(path: &str) -> Result<Self, NativeError> {
        let call = RequestKind::AccountingRecord.native_call();
        let name = cstring(call, path)?;
        // SAFETY: both arguments are valid NUL terminated strings.
        let fp = unsafe { libc::fopen(name.as_ptr(), c"r".as_ptr()) };
        if fp.is_null() {
            return Err(NativeError {
                call,
                code: ErrorCode::FILE_SYS,
                message: Some(format!("cannot open {path}: {}", std::io::Error::last_os_error())),
            });
        }
        debug!(path, "opened accounting file");
        Ok(Self { path: path.to_string(), fp, line: 0 })
    }
}

impl Drop for AcctFile {
    fn drop(&mut self) {
        // SAFETY: fp came from fopen and is closed once.
        unsafe { libc::fclose(self.fp) };
    }
}

/// [`NativeSurface`] backed by the linked library.
pub struct LiveSurface {
    memory: ProcessMemory,
    acct: Option<AcctFile>,
}

impl LiveSurface {
    /// Initialises the library for this process on first use.
    pub fn new() -> Result<Self, NativeError> {
        INIT.get_or_init(|| {
            // SAFETY: static NUL terminated name.
            let rc = unsafe { ls_initdebug(c"lsfview".as_ptr()) };
            if rc < 0 {
                return Err(last_error("ls_initdebug"));
            }
            info!("liblsf initialised");
            Ok(())
        })
        .clone()?;
        // SAFETY: addresses handed to this memory come from library results.
        let memory = unsafe { ProcessMemory::new() };
        Ok(Self { memory, acct: None })
    }

    fn accounting(&mut self, file: &str) -> Result<RawResult, NativeError> {
        let call = RequestKind::AccountingRecord.native_call();
        if self.acct.as_ref().is_none_or(|acct| acct.path != file) {
            self.acct = Some(AcctFile::open(file)?);
        }
        let Some(acct) = self.acct.as_mut() else {
            return Err(NativeError::new(call, ErrorCode::FILE_SYS));
        };
        // SAFETY: fp is open and line is a valid out parameter.
        let record = unsafe { ls_getacctrec(acct.fp, &mut acct.line) };
        if record.is_null() {
            let err = last_error(call);
            if err.code == ErrorCode::EOF {
                self.acct = None;
            }
            return Err(err);
        }
        Ok(RawResult::new(RequestKind::AccountingRecord, addr_of(record)))
    }
}

fn addr_of<T>(ptr: *const T) -> NativeAddr {
    NativeAddr(ptr as usize as u64)
}

fn counted<T>(kind: RequestKind, ptr: *const T, count: c_int) -> Result<RawResult, NativeError> {
    if ptr.is_null() {
        return Err(last_error(kind.native_call()));
    }
    Ok(RawResult::new(kind, addr_of(ptr)).with_count(count))
}

fn single<T>(kind: RequestKind, ptr: *const T) -> Result<RawResult, NativeError> {
    if ptr.is_null() {
        return Err(last_error(kind.native_call()));
    }
    Ok(RawResult::new(kind, addr_of(ptr)))
}

impl NativeSurface for LiveSurface {
    fn name(&self) -> &'static str {
        "liblsf"
    }

    fn memory(&self) -> &dyn NativeMemory {
        &self.memory
    }

    fn call(&mut self, request: &Request) -> Result<RawResult, NativeError> {
        let kind = request.kind();
        let call = kind.native_call();
        debug!(?request, "native call");

        // SAFETY (all arms): every pointer argument is either null or owned
        // by a local that outlives the call; out parameters are locals.
        match request {
            Request::ClusterName => single(kind, unsafe { ls_getclustername() }),
            Request::MasterName => single(kind, unsafe { ls_getmastername() }),
            Request::HostInfo { resreq, hosts, options } => {
                let resreq = opt_cstring(call, resreq)?;
                let mut hosts = CStringList::new(call, hosts)?;
                let mut count: c_int = 0;
                let result = unsafe {
                    ls_gethostinfo(opt_ptr(&resreq), &mut count, hosts.as_mut_ptr(), hosts.len(), *options)
                };
                counted(kind, result, count)
            }
            Request::ClusterInfo { resreq, clusters, options } => {
                let resreq = opt_cstring(call, resreq)?;
                let mut clusters = CStringList::new(call, clusters)?;
                let mut count: c_int = 0;
                let result = unsafe {
                    ls_clusterinfo(opt_ptr(&resreq), &mut count, clusters.as_mut_ptr(), clusters.len(), *options)
                };
                counted(kind, result, count)
            }
            Request::Load { resreq, hosts, options, from_host } => {
                let resreq = opt_cstring(call, resreq)?;
                let from_host = opt_cstring(call, from_host)?;
                let mut count: c_int = 0;
                let result = if hosts.is_empty() {
                    unsafe { ls_load(opt_ptr(&resreq), &mut count, *options, opt_ptr(&from_host)) }
                } else {
                    let mut hosts = CStringList::new(call, hosts)?;
                    unsafe {
                        ls_loadofhosts(
                            opt_ptr(&resreq),
                            &mut count,
                            *options,
                            opt_ptr(&from_host),
                            hosts.as_mut_ptr(),
                            hosts.len(),
                        )
                    }
                };
                counted(kind, result, count)
            }
            Request::Info => single(kind, unsafe { ls_info() }),
            Request::IndexNames { info } => {
                // info is the address of a live ls_info result.
                let info = info.0 as usize as *mut c_void;
                single(kind, unsafe { ls_indexnames(info) })
            }
            Request::HostType { host } => {
                let host = opt_cstring(call, host)?;
                single(kind, unsafe { ls_gethosttype(opt_ptr(&host)) })
            }
            Request::HostModel { host } => {
                let host = opt_cstring(call, host)?;
                single(kind, unsafe { ls_gethostmodel(opt_ptr(&host)) })
            }
            Request::HostFactor { host } => {
                let host = opt_cstring(call, host)?;
                single(kind, unsafe { ls_gethostfactor(opt_ptr(&host)) })
            }
            Request::PlaceReq { resreq, num_hosts, options, from_host } => {
                let resreq = opt_cstring(call, resreq)?;
                let from_host = opt_cstring(call, from_host)?;
                let mut count: c_int = *num_hosts;
                let result =
                    unsafe { ls_placereq(opt_ptr(&resreq), &mut count, *options, opt_ptr(&from_host)) };
                counted(kind, result, count)
            }
            Request::SharedResourceInfo { resources, hostname } => {
                let mut resources = CStringList::new(call, resources)?;
                let hostname = opt_cstring(call, hostname)?;
                let mut count = resources.len();
                let result = unsafe {
                    ls_sharedresourceinfo(resources.as_mut_ptr(), &mut count, opt_ptr(&hostname), 0)
                };
                counted(kind, result, count)
            }
            Request::ReadCluster { file } => {
                let file = cstring(call, file)?;
                let info = unsafe { ls_info() };
                if info.is_null() {
                    return Err(last_error(RequestKind::Info.native_call()));
                }
                single(kind, unsafe { ls_readcluster(file.as_ptr(), info) })
            }
            Request::GetConf { file } => {
                let file = cstring(call, file)?;
                let conf = unsafe { ls_getconf(file.as_ptr()) };
                let raw = single(kind, conf)?;
                let owned = conf as usize;
                Ok(raw.with_release(move || {
                    // SAFETY: conf came from ls_getconf and the hook runs once.
                    unsafe { ls_freeconf(owned as *mut c_void) };
                }))
            }
            Request::AccountingRecord { file } => self.accounting(file),
        }
    }
}
