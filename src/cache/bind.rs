//! Mounting cache containers and binding them onto external directories

use crate::cache::options::{MountOptions, MOUNT_DIR_ARG};
use crate::cache::rollback::{Rollback, RollbackStep};
use crate::error::{LayerCacheError, LayerCacheResult};
use crate::storage::{ContainerStore, WorkingContainer};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bind mount primitive used to expose a container directory elsewhere
pub trait BindMount: Send + Sync {
    /// Bind `source` read-write onto `target`
    fn bind(&self, source: &Path, target: &Path) -> io::Result<()>;

    /// Detach whatever is mounted at `target`
    fn unbind(&self, target: &Path) -> io::Result<()>;
}

impl<T: BindMount + ?Sized> BindMount for Arc<T> {
    fn bind(&self, source: &Path, target: &Path) -> io::Result<()> {
        (**self).bind(source, target)
    }

    fn unbind(&self, target: &Path) -> io::Result<()> {
        (**self).unbind(target)
    }
}

/// Bind mounts through the mount(2) system call
#[derive(Debug, Default, Clone, Copy)]
pub struct SysBindMount;

#[cfg(target_os = "linux")]
fn c_path(path: &Path) -> io::Result<std::ffi::CString> {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

#[cfg(target_os = "linux")]
impl BindMount for SysBindMount {
    fn bind(&self, source: &Path, target: &Path) -> io::Result<()> {
        let src = c_path(source)?;
        let dst = c_path(target)?;
        // SAFETY: both pointers reference NUL-terminated strings that outlive the call.
        let rc = unsafe {
            libc::mount(
                src.as_ptr(),
                dst.as_ptr(),
                std::ptr::null(),
                libc::MS_BIND,
                std::ptr::null(),
            )
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn unbind(&self, target: &Path) -> io::Result<()> {
        let dst = c_path(target)?;
        // SAFETY: dst is a NUL-terminated string that outlives the call.
        let rc = unsafe { libc::umount2(dst.as_ptr(), 0) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl BindMount for SysBindMount {
    fn bind(&self, _source: &Path, _target: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "bind mounts require Linux",
        ))
    }

    fn unbind(&self, _target: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "bind mounts require Linux",
        ))
    }
}

/// Create the external mount directory with no permissions.
///
/// The bind mount replaces its mode with that of the container directory.
pub async fn create_mount_dir(dir: &Path) -> LayerCacheResult<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(0o000);
    builder
        .create(dir)
        .await
        .map_err(|e| LayerCacheError::io(format!("creating mount directory {}", dir.display()), e))
}

/// Unbind `dir` and remove it.
///
/// An unbind failure only matters when the directory cannot be removed
/// afterwards; a missing directory counts as released.
pub async fn unbind_and_remove(mounter: &dyn BindMount, dir: &Path) -> LayerCacheResult<()> {
    debug!(dir = %dir.display(), "unmounting cache");
    let unbound = mounter.unbind(dir);
    match tokio::fs::remove_dir(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            if let Err(unbind_err) = unbound {
                warn!(dir = %dir.display(), error = %unbind_err, "failed to unbind cache directory");
            }
            Err(LayerCacheError::io(
                format!("removing mount directory {}", dir.display()),
                e,
            ))
        }
    }
}

/// Mount a freshly acquired container and bind it onto the requested directory.
///
/// Every completed step is registered on `rollback`, so a failure part way
/// leaves nothing mounted once the caller unwinds.
pub async fn bind_container(
    store: &dyn ContainerStore,
    mounter: &dyn BindMount,
    container: &mut WorkingContainer,
    opts: &MountOptions,
    rollback: &mut Rollback,
) -> LayerCacheResult<PathBuf> {
    info!(container = %container.name, "mounting cache container");
    let dir = store
        .mount(container, container.mount_label.as_deref())
        .await?;
    container.mount_point = Some(dir.clone());
    rollback.push(RollbackStep::UnmountContainer(container.clone()));

    let Some(ext_dir) = opts.mount_dir() else {
        return Ok(dir);
    };

    container.args.insert(
        MOUNT_DIR_ARG.to_string(),
        ext_dir.to_string_lossy().into_owned(),
    );
    store.save(container).await?;

    debug!(
        source = %dir.display(),
        target = %ext_dir.display(),
        "binding container dir"
    );
    mounter.bind(&dir, ext_dir).map_err(|e| {
        LayerCacheError::io(
            format!("binding {} onto {}", dir.display(), ext_dir.display()),
            e,
        )
    })?;
    rollback.push(RollbackStep::Unbind(ext_dir.to_path_buf()));

    Ok(ext_dir.to_path_buf())
}
