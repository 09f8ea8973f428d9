// src/downloader/writer.rs

use crate::{
    constants,
    error::{AppError, AppResult},
    models::WrittenFile,
    utils,
};
use log::{debug, info};
use md5::{Digest, Md5};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

/// 课程输出目录下的原子写入器。
///
/// 内容先写入目标目录中的临时文件，完成后才以最终文件名出现。
/// 同名文件内容相同则直接沿用；内容不同则依次尝试 `-2`、`-3`… 后缀，
/// 绝不覆盖已有文件。
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> AppResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 章节路径对应的目录，不存在则创建
    pub fn section_dir(&self, section_path: &[String]) -> AppResult<PathBuf> {
        let relative: PathBuf = section_path
            .iter()
            .map(|part| utils::sanitize_filename(part))
            .collect();
        let dir = utils::secure_join_path(&self.root, &relative)?;
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn begin(&self, section_path: &[String], filename: &str) -> AppResult<PendingFile> {
        let dir = self.section_dir(section_path)?;
        let filename = utils::sanitize_filename(filename);
        let temp = tempfile::Builder::new()
            .prefix(".part-")
            .tempfile_in(&dir)?;
        debug!("开始写入 '{}' (临时文件 {:?})", filename, temp.path());
        Ok(PendingFile {
            temp,
            dir,
            filename,
            hasher: Md5::new(),
            written: 0,
        })
    }

    pub fn write_bytes(&self, section_path: &[String], filename: &str, bytes: &[u8]) -> AppResult<WrittenFile> {
        let mut pending = self.begin(section_path, filename)?;
        pending.write_chunk(bytes)?;
        pending.commit()
    }
}

/// 尚未发布的写入。被丢弃时临时文件随之删除，不会留下半成品。
pub struct PendingFile {
    temp: NamedTempFile,
    dir: PathBuf,
    filename: String,
    hasher: Md5,
    written: u64,
}

impl PendingFile {
    pub fn write_chunk(&mut self, chunk: &[u8]) -> AppResult<()> {
        self.temp.write_all(chunk)?;
        self.hasher.update(chunk);
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn commit(mut self) -> AppResult<WrittenFile> {
        self.temp.as_file_mut().flush()?;
        self.temp.as_file().sync_all()?;
        let digest = format!("{:x}", self.hasher.finalize_reset());

        let mut temp = self.temp;
        for candidate in candidate_names(&self.filename) {
            let path = self.dir.join(&candidate);
            if path.exists() {
                if utils::calculate_file_md5(&path)? == digest {
                    info!("'{}' 内容未变化，沿用已有文件", path.display());
                    return Ok(WrittenFile { path, reused: true });
                }
                debug!("'{}' 已存在且内容不同，尝试下一个文件名", path.display());
                continue;
            }
            match temp.persist_noclobber(&path) {
                Ok(_) => {
                    info!("已保存: {} ({} 字节)", path.display(), self.written);
                    return Ok(WrittenFile { path, reused: false });
                }
                // 检查与发布之间被其他进程占用
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => temp = e.file,
                Err(e) => return Err(e.into()),
            }
        }
        Err(AppError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("'{}' 的可用文件名已耗尽", self.filename),
        )))
    }
}

/// `name.ext`, `name-2.ext`, `name-3.ext`, …
fn candidate_names(filename: &str) -> impl Iterator<Item = String> + '_ {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    std::iter::once(filename.to_string()).chain(
        (2..=constants::MAX_COLLISION_SUFFIX).map(move |n| format!("{}-{}{}", stem, n, ext)),
    )
}
