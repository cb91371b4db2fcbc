// Shader module loading
//
// Vulkan consumes SPIR-V. The compiled blobs are read from disk once at
// startup; build.rs produces them from shaders/*.vert / *.frag.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use super::VulkanDevice;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode a SPIR-V blob into aligned words, checking length and magic number
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).context("Invalid SPIR-V length")?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => anyhow::bail!("Not a SPIR-V module (magic {:#010x})", other),
        None => anyhow::bail!("Empty SPIR-V module"),
    }
}

/// Compiled vertex + fragment code, read once at startup and reused for
/// every pipeline rebuild
#[derive(Debug, Clone)]
pub struct ShaderCode {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderCode {
    pub fn load(vertex: &Path, fragment: &Path) -> Result<Self> {
        Ok(Self {
            vertex: read_spirv_file(vertex)?,
            fragment: read_spirv_file(fragment)?,
        })
    }
}

fn read_spirv_file(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read shader file: {:?}", path))?;
    log::debug!("Loaded shader {:?} ({} bytes)", path, bytes.len());

    parse_spirv(&bytes).with_context(|| format!("Failed to load shader: {:?}", path))
}

/// Shader module that lives only as long as pipeline creation needs it
pub struct ShaderModule {
    pub module: vk::ShaderModule,
    device: Arc<VulkanDevice>,
}

impl ShaderModule {
    pub fn new(device: &Arc<VulkanDevice>, code: &[u32]) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .context("Failed to create shader module")?;

        Ok(Self {
            module,
            device: device.clone(),
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_header() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        assert_eq!(parse_spirv(&bytes).unwrap(), vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn rejects_truncated_blob() {
        assert!(parse_spirv(&[0x03, 0x02, 0x23]).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = ShaderCode::load(Path::new("no/such/shader.vert.spv"), Path::new("no/such/shader.frag.spv"))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("no/such/shader.vert.spv"));
    }

    #[test]
    fn rejects_wrong_magic() {
        assert!(parse_spirv(&0xdead_beefu32.to_le_bytes()).is_err());
        assert!(parse_spirv(&[]).is_err());
    }
}
