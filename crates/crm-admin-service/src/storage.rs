//! 本地磁盘文件存储
//!
//! 上传文件保存在 `storage.upload_dir` 下，路径由业务层生成（`{client_id}/{uuid}.{ext}`）。

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use crm_core::service::FileStore;
use tokio::fs;

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 解析为存储根目录下的绝对路径，拒绝跳出根目录的相对路径
    fn resolve(&self, relative: &str) -> io::Result<PathBuf> {
        let path = Path::new(relative);
        let safe = !relative.is_empty()
            && path
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("非法的存储路径: {relative}"),
            ));
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl FileStore for LocalStorage {
    async fn save(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, bytes).await
    }

    async fn load(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(path)?).await
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        match fs::remove_file(self.resolve(path)?).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage.save("42/abc.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(storage.load("42/abc.pdf").await.unwrap(), b"%PDF-1.4");

        storage.delete("42/abc.pdf").await.unwrap();
        assert!(storage.load("42/abc.pdf").await.is_err());
        // 重复删除不报错
        storage.delete("42/abc.pdf").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        for path in ["../secret", "/etc/passwd", "42/../../x", "", "./a"] {
            let err = storage.save(path, b"x").await.unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "{path}");
        }
    }
}
