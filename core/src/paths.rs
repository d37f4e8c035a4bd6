use path_absolutize::Absolutize;
use std::io;
use std::path::Path;
use std::path::PathBuf;

/// Resolve `path` against `working_dir` and normalise `.` / `..` components.
pub fn make_absolute(path: &Path, working_dir: &Path) -> io::Result<PathBuf> {
    Ok(path.absolutize_from(working_dir)?.into_owned())
}

/// The path of `absolute` relative to `base_dir`, or `None` if it does not
/// live under `base_dir`.
pub fn relative_to_base(absolute: &Path, base_dir: &Path) -> Option<PathBuf> {
    absolute
        .strip_prefix(base_dir)
        .ok()
        .filter(|relative| !relative.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
