//! Build context archiving.
//!
//! The Engine build API takes the context as a tar stream. The generated
//! script travels inside the same archive under a reserved file name.
//! Paths matched by the context's `.dockerignore` are left out.

use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::io;
use std::path::Path;

/// Name the generated script is stored under inside the context archive.
pub const SCRIPT_FILE_NAME: &str = ".modelpack.Dockerfile";

/// Exclusion file read from the root of the build context.
pub const DOCKERIGNORE_FILE: &str = ".dockerignore";

/// Archive `context` plus the generated `script` into an in-memory tar.
pub fn archive_context(context: &Path, script: &str) -> io::Result<Vec<u8>> {
    if !context.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("build context {} is not a directory", context.display()),
        ));
    }

    let matcher = ignore_matcher(context)?;
    let root = context.to_path_buf();
    let walker = WalkBuilder::new(context)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| match entry.path().strip_prefix(&root) {
            Ok(relative) if !relative.as_os_str().is_empty() => {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !matcher.matched(relative, is_dir).is_ignore()
            }
            _ => true,
        })
        .build();

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let path = entry.path();
        let relative = match path.strip_prefix(context) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative,
            _ => continue,
        };

        if entry.file_type().is_some_and(|t| t.is_dir()) {
            builder.append_dir(relative, path)?;
        } else {
            builder.append_path_with_name(path, relative)?;
        }
    }

    append_script(&mut builder, script)?;
    builder.into_inner()
}

/// Archive a context that contains nothing but `script`.
pub fn archive_script(script: &str) -> io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    append_script(&mut builder, script)?;
    builder.into_inner()
}

/// Load `.dockerignore` patterns; an absent file matches nothing.
fn ignore_matcher(context: &Path) -> io::Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(context);
    let path = context.join(DOCKERIGNORE_FILE);
    if path.is_file() {
        if let Some(e) = builder.add(&path) {
            return Err(io::Error::new(io::ErrorKind::InvalidData, e));
        }
    }
    builder
        .build()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn append_script<W: io::Write>(builder: &mut tar::Builder<W>, script: &str) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(script.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, SCRIPT_FILE_NAME, script.as_bytes())
}
