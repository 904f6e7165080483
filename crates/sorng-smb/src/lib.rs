//! # SortOfRemote NG – SMB
//!
//! SMB/CIFS network share access providing:
//!   • One short-lived session per operation (connect → authenticate → attach share)
//!   • Guest sessions when no credentials are configured
//!   • A single operation gate so the protocol client is never driven concurrently
//!   • Resumable downloads and full-restart uploads with linear retry backoff
//!   • Cooperative, cancellable recursive search with wildcard matching
//!   • Native directory rename and copy-verify-delete file rename
//!   • Whole-folder download built on the single-file retry path
//!   • smbclient subprocess backend plus an in-memory share server

pub mod smb;
