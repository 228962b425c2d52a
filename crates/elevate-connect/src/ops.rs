//! Method names on the bridge channel and decoding of file operations

use elevate_core_interface::{ArgumentError, Arguments, FileService, Value};
use std::path::PathBuf;

/// The six file operations forwarded to the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMethod {
    ListFiles,
    ReadFile,
    WriteFile,
    FileSize,
    Exists,
    DeleteFile,
}

impl FileMethod {
    pub const ALL: [FileMethod; 6] = [
        FileMethod::ListFiles,
        FileMethod::ReadFile,
        FileMethod::WriteFile,
        FileMethod::FileSize,
        FileMethod::Exists,
        FileMethod::DeleteFile,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FileMethod::ListFiles => "listFiles",
            FileMethod::ReadFile => "readFile",
            FileMethod::WriteFile => "writeFile",
            FileMethod::FileSize => "fileSize",
            FileMethod::Exists => "exists",
            FileMethod::DeleteFile => "deleteFile",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

/// Every method the bridge answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeMethod {
    GetState,
    RequestPermission,
    File(FileMethod),
}

impl BridgeMethod {
    pub const GET_STATE: &'static str = "getShizukuState";
    pub const REQUEST_PERMISSION: &'static str = "requestShizukuPermission";

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            Self::GET_STATE => Some(BridgeMethod::GetState),
            Self::REQUEST_PERMISSION => Some(BridgeMethod::RequestPermission),
            other => FileMethod::from_name(other).map(BridgeMethod::File),
        }
    }
}

/// A decoded file operation, ready to run against a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    ListFiles(PathBuf),
    ReadFile(PathBuf),
    WriteFile(PathBuf, Vec<u8>),
    FileSize(PathBuf),
    Exists(PathBuf),
    DeleteFile(PathBuf),
}

impl FileOp {
    /// Pull `path` (and `bytes` for writes) out of the argument bundle
    pub fn decode(method: FileMethod, args: &Arguments) -> Result<Self, ArgumentError> {
        let path = PathBuf::from(args.require_str("path")?);
        Ok(match method {
            FileMethod::ListFiles => FileOp::ListFiles(path),
            FileMethod::ReadFile => FileOp::ReadFile(path),
            FileMethod::WriteFile => FileOp::WriteFile(path, args.require_bytes("bytes")?.to_vec()),
            FileMethod::FileSize => FileOp::FileSize(path),
            FileMethod::Exists => FileOp::Exists(path),
            FileMethod::DeleteFile => FileOp::DeleteFile(path),
        })
    }

    pub async fn invoke(self, service: &dyn FileService) -> elevate_core_interface::Result<Value> {
        Ok(match self {
            FileOp::ListFiles(path) => Value::from(service.list_files(&path).await?),
            FileOp::ReadFile(path) => Value::Bytes(service.read_file(&path).await?),
            FileOp::WriteFile(path, data) => Value::Bool(service.write_file(&path, &data).await?),
            FileOp::FileSize(path) => Value::Int(service.file_size(&path).await?),
            FileOp::Exists(path) => Value::Bool(service.exists(&path).await?),
            FileOp::DeleteFile(path) => Value::Bool(service.delete_file(&path).await?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names_resolve() {
        for method in FileMethod::ALL {
            assert_eq!(
                BridgeMethod::from_name(method.name()),
                Some(BridgeMethod::File(method))
            );
        }
        assert_eq!(
            BridgeMethod::from_name("getShizukuState"),
            Some(BridgeMethod::GetState)
        );
        assert_eq!(BridgeMethod::from_name("renameFile"), None);
    }

    #[test]
    fn test_decode_requires_path() {
        let err = FileOp::decode(FileMethod::Exists, &Arguments::new()).unwrap_err();
        assert_eq!(err, ArgumentError::Missing("path".to_string()));
    }

    #[test]
    fn test_decode_write_requires_bytes() {
        let args = Arguments::new().with("path", "/tmp/x").with("bytes", "AB");
        let err = FileOp::decode(FileMethod::WriteFile, &args).unwrap_err();
        assert!(matches!(err, ArgumentError::WrongType { .. }));

        let args = Arguments::new().with("path", "/tmp/x").with("bytes", b"AB".to_vec());
        assert_eq!(
            FileOp::decode(FileMethod::WriteFile, &args).unwrap(),
            FileOp::WriteFile(PathBuf::from("/tmp/x"), b"AB".to_vec())
        );
    }
}
