// src/engine/finalize.rs

//! Thread finalization: write the final tree and alignments of a thread
//! once it has no pending work.

use std::fs;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ConfigSection;
use crate::context::ThreadState;
use crate::errors::Result;
use crate::job::shell_quote;
use crate::task::finish::{ALIGNMENT, CLEAN_ALIGNMENT};

/// Final tree assembled for a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledTree {
    pub newick: String,
    pub iterations: u32,
}

/// Builds the final tree of a thread from what it recorded.
pub trait Assembler: Send + Sync {
    fn assemble(&self, thread: &ThreadState) -> Result<Option<AssembledTree>>;
}

/// Uses the most recently recorded tree as the final one.
#[derive(Debug, Default)]
pub struct LatestTreeAssembler;

impl Assembler for LatestTreeAssembler {
    fn assemble(&self, thread: &ThreadState) -> Result<Option<AssembledTree>> {
        let Some(path) = thread.trees.last() else {
            return Ok(None);
        };
        let newick = fs::read_to_string(path)?.trim().to_string();
        Ok(Some(AssembledTree {
            newick,
            iterations: thread.iteration,
        }))
    }
}

/// Paths of the final artifacts of a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalPaths {
    pub tree: PathBuf,
    pub extended: PathBuf,
    pub alignment: PathBuf,
    pub trimmed: PathBuf,
    pub image: PathBuf,
}

impl FinalPaths {
    pub fn new(outpath: &Path, base_name: &str) -> Self {
        let stem = format!("{base_name}.final_tree");
        Self {
            tree: outpath.join(format!("{stem}.nw")),
            extended: outpath.join(format!("{stem}.nwx")),
            alignment: outpath.join(format!("{stem}.fa")),
            trimmed: outpath.join(format!("{stem}.trimmed.fa")),
            image: outpath.join(format!("{stem}.png")),
        }
    }
}

/// What finalization actually wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalArtifacts {
    pub tree: PathBuf,
    pub extended: PathBuf,
    pub alignment: Option<PathBuf>,
    pub trimmed: Option<PathBuf>,
    pub image: Option<PathBuf>,
}

pub struct Finalizer {
    assembler: Box<dyn Assembler>,
    base_name: String,
    render_cmd: Option<String>,
}

impl Finalizer {
    pub fn new(assembler: Box<dyn Assembler>, base_name: impl Into<String>) -> Self {
        Self {
            assembler,
            base_name: base_name.into(),
            render_cmd: None,
        }
    }

    pub fn from_config(cfg: &ConfigSection) -> Self {
        Self::new(Box::new(LatestTreeAssembler), cfg.base_name.clone())
            .with_render_cmd(cfg.render_cmd.clone())
    }

    pub fn with_render_cmd(mut self, render_cmd: Option<String>) -> Self {
        self.render_cmd = render_cmd;
        self
    }

    /// Write the final artifacts of `thread`. Returns `None`, writing
    /// nothing, when there is no tree to assemble.
    pub async fn finalize(&self, thread: &ThreadState) -> Result<Option<FinalArtifacts>> {
        let Some(tree) = self.assembler.assemble(thread)? else {
            return Ok(None);
        };

        let paths = FinalPaths::new(&thread.outpath, &self.base_name);
        fs::create_dir_all(&thread.outpath)?;

        fs::write(&paths.tree, format!("{}\n", tree.newick))?;
        let annotated = annotate_root(
            &tree.newick,
            &[
                ("name", thread.name.as_str()),
                ("iterations", &tree.iterations.to_string()),
            ],
        );
        fs::write(&paths.extended, format!("{annotated}\n"))?;

        let alignment = copy_artifact(thread, ALIGNMENT, &paths.alignment)?;
        let trimmed = copy_artifact(thread, CLEAN_ALIGNMENT, &paths.trimmed)?;
        let image = self.render(&paths).await;

        info!(
            thread = %thread.id,
            tree = %paths.tree.display(),
            iterations = tree.iterations,
            "final tree written"
        );

        Ok(Some(FinalArtifacts {
            tree: paths.tree,
            extended: paths.extended,
            alignment,
            trimmed,
            image,
        }))
    }

    /// Render the tree image. Failures are warnings only.
    async fn render(&self, paths: &FinalPaths) -> Option<PathBuf> {
        let template = self.render_cmd.as_deref()?;
        let cmd = template
            .replace("{tree}", &shell_quote(&paths.tree.to_string_lossy()))
            .replace("{image}", &shell_quote(&paths.image.to_string_lossy()));
        debug!(cmd = %cmd, "rendering final tree");

        match Command::new("sh").arg("-c").arg(&cmd).status().await {
            Ok(status) if status.success() => Some(paths.image.clone()),
            Ok(status) => {
                warn!(cmd = %cmd, %status, "tree rendering failed; skipping image");
                None
            }
            Err(e) => {
                warn!(cmd = %cmd, error = %e, "could not run tree renderer; skipping image");
                None
            }
        }
    }
}

fn copy_artifact(thread: &ThreadState, name: &str, dest: &Path) -> Result<Option<PathBuf>> {
    match thread.artifact(name) {
        Some(src) => {
            fs::copy(src, dest)?;
            Ok(Some(dest.to_path_buf()))
        }
        None => Ok(None),
    }
}

/// Attach an NHX comment to the root of a newick tree.
///
/// `(A,B);` with `[("name", "t1")]` becomes `(A,B)[&&NHX:name=t1];`.
pub fn annotate_root(newick: &str, fields: &[(&str, &str)]) -> String {
    let body = newick.trim().trim_end_matches(';');
    let tags: String = fields.iter().map(|(k, v)| format!(":{k}={v}")).collect();
    format!("{body}[&&NHX{tags}];")
}
