// Shader module loading
//
// Shaders are precompiled SPIR-V blobs read from disk at startup. A missing,
// unreadable or malformed blob is fatal.

use crate::error::{EngineError, Result, VkResultExt};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

/// Read a SPIR-V file into 32-bit words (checks size and magic number).
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let read_failed = |source| EngineError::ResourceReadFailed {
        path: path.to_path_buf(),
        source,
    };

    let bytes = std::fs::read(path).map_err(read_failed)?;
    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(read_failed)
}

/// A shader module destroyed on drop. Only needed until the pipeline exists.
pub struct ShaderModule {
    pub module: vk::ShaderModule,
    device: ash::Device,
}

impl ShaderModule {
    pub fn new(device: &ash::Device, code: &[u32]) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

        let module = unsafe { device.create_shader_module(&create_info, None) }
            .creating("shader module")?;

        Ok(Self {
            module,
            device: device.clone(),
        })
    }

    pub fn load(device: &ash::Device, path: &Path) -> Result<Self> {
        log::debug!("Loading shader {:?}", path);
        Self::new(device, &read_spirv(path)?)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn write_blob(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn reads_little_endian_words() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let file = write_blob(&bytes);

        let words = read_spirv(file.path()).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn missing_file_is_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vert.spv");
        match read_spirv(&path) {
            Err(EngineError::ResourceReadFailed { path: failed, source }) => {
                assert_eq!(failed, path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let file = write_blob(&SPIRV_MAGIC.to_le_bytes()[..3]);
        assert!(matches!(
            read_spirv(file.path()),
            Err(EngineError::ResourceReadFailed { .. })
        ));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let file = write_blob(&0xDEAD_BEEFu32.to_le_bytes());
        assert!(matches!(
            read_spirv(file.path()),
            Err(EngineError::ResourceReadFailed { .. })
        ));
    }
}
