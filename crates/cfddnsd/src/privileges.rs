//! Run-as user/group switch
//!
//! Done after the PID lock and the log file are open, so files only root
//! may create already exist. Those files are handed over to the new owner
//! first so the daemon can still remove and append to them.

use std::ffi::CString;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};

/// Resolved target identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: Option<libc::uid_t>,
    pub gid: Option<libc::gid_t>,
}

impl Identity {
    /// Resolve user and group names
    ///
    /// A user without an explicit group runs with the user's primary group.
    pub fn resolve(user: Option<&str>, group: Option<&str>) -> Result<Self> {
        let user = user.map(lookup_user).transpose()?;
        let gid = match group {
            Some(name) => Some(lookup_group(name)?),
            None => user.map(|(_, primary)| primary),
        };

        Ok(Self {
            uid: user.map(|(uid, _)| uid),
            gid,
        })
    }

    pub fn is_noop(&self) -> bool {
        self.uid.is_none() && self.gid.is_none()
    }
}

/// Hand `files` to the identity and switch the process to it
pub fn drop_to(identity: Identity, files: &[&Path]) -> Result<()> {
    if identity.is_noop() {
        return Ok(());
    }

    for file in files {
        chown(file, identity)?;
    }

    if let Some(gid) = identity.gid {
        // SAFETY: plain syscalls on integer arguments; the group list
        // pointer is valid for one element.
        unsafe {
            if libc::geteuid() == 0 && libc::setgroups(1, &gid) != 0 {
                return Err(std::io::Error::last_os_error())
                    .context("Failed to reset supplementary groups");
            }
            if libc::setgid(gid) != 0 {
                return Err(std::io::Error::last_os_error())
                    .with_context(|| format!("Failed to switch to group {}", gid));
            }
        }
    }

    if let Some(uid) = identity.uid {
        // SAFETY: plain syscall on an integer argument.
        if unsafe { libc::setuid(uid) } != 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("Failed to switch to user {}", uid));
        }
    }

    tracing::info!(uid = ?identity.uid, gid = ?identity.gid, "Dropped privileges");
    Ok(())
}

fn chown(path: &Path, identity: Identity) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .with_context(|| format!("Invalid path {}", path.display()))?;

    // -1 (all bits set) leaves that id unchanged
    let uid = identity.uid.unwrap_or(libc::uid_t::MAX);
    let gid = identity.gid.unwrap_or(libc::gid_t::MAX);

    // SAFETY: c_path is a valid NUL-terminated string for the call.
    if unsafe { libc::chown(c_path.as_ptr(), uid, gid) } != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("Failed to change owner of {}", path.display()));
    }
    Ok(())
}

/// (uid, primary gid) of a user name
fn lookup_user(name: &str) -> Result<(libc::uid_t, libc::gid_t)> {
    let c_name = CString::new(name).map_err(|_| anyhow!("Invalid user name '{}'", name))?;

    // SAFETY: getpwnam returns NULL or a pointer to static storage that
    // stays valid until the next getpw* call; fields are copied out
    // immediately and no other thread queries the user database.
    let entry = unsafe { libc::getpwnam(c_name.as_ptr()) };
    if entry.is_null() {
        bail!("Unknown user '{}'", name);
    }
    let (uid, gid) = unsafe { ((*entry).pw_uid, (*entry).pw_gid) };
    Ok((uid, gid))
}

fn lookup_group(name: &str) -> Result<libc::gid_t> {
    let c_name = CString::new(name).map_err(|_| anyhow!("Invalid group name '{}'", name))?;

    // SAFETY: as for getpwnam.
    let entry = unsafe { libc::getgrnam(c_name.as_ptr()) };
    if entry.is_null() {
        bail!("Unknown group '{}'", name);
    }
    Ok(unsafe { (*entry).gr_gid })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_user_resolves() {
        let identity = Identity::resolve(Some("root"), None).unwrap();
        assert_eq!(identity.uid, Some(0));
        assert_eq!(identity.gid, Some(0));
    }

    #[test]
    fn unknown_names_are_errors() {
        let err = Identity::resolve(Some("no-such-user-cfddns"), None).unwrap_err();
        assert!(err.to_string().contains("no-such-user-cfddns"));
        assert!(Identity::resolve(None, Some("no-such-group-cfddns")).is_err());
    }

    #[test]
    fn nothing_requested_is_noop() {
        let identity = Identity::resolve(None, None).unwrap();
        assert!(identity.is_noop());
        assert!(drop_to(identity, &[]).is_ok());
    }
}
