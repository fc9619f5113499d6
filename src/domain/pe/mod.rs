//! PE (Portable Executable) domain types and operations.
//!
//! Provides header layout parsing for PE32 and PE32+ images, the image
//! checksum, and an in-memory image that owns its certificate table:
//! clearing it, reserving space for new signatures and rewriting it.

mod checksum;
mod image;
mod layout;

pub use checksum::{calculate_pe_checksum, update_pe_checksum};
pub use image::{CertificateDirectory, PeImage};
pub use layout::{PeLayout, SectionSpan};

#[cfg(test)]
pub(crate) mod test_support {
    //! Synthetic PE32 images for unit tests.

    pub const TEXT_OFFSET: usize = 0x200;
    pub const TEXT_SIZE: usize = 0x200;

    fn put_u16(buf: &mut [u8], at: usize, v: u16) {
        buf[at..at + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn put_u32(buf: &mut [u8], at: usize, v: u32) {
        buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Offset of the security directory entry in images from [`pe32`].
    pub const CERT_DIR_OFFSET: usize = 0x40 + 24 + 96 + 4 * 8;

    /// PE32 image with one `.text` section and `trailing` overlay bytes.
    pub fn pe32(trailing: &[u8]) -> Vec<u8> {
        let pe = 0x40;
        let mut buf = vec![0u8; TEXT_OFFSET + TEXT_SIZE];
        buf[..2].copy_from_slice(b"MZ");
        put_u32(&mut buf, 0x3c, pe as u32);
        buf[pe..pe + 4].copy_from_slice(b"PE\0\0");
        put_u16(&mut buf, pe + 4, 0x14c);
        put_u16(&mut buf, pe + 6, 1);
        put_u16(&mut buf, pe + 20, 224);
        put_u16(&mut buf, pe + 22, 0x0102);

        let opt = pe + 24;
        put_u16(&mut buf, opt, 0x10b);
        put_u32(&mut buf, opt + 28, 0x40_0000);
        put_u32(&mut buf, opt + 32, 0x1000);
        put_u32(&mut buf, opt + 36, 0x200);
        put_u32(&mut buf, opt + 56, 0x2000);
        put_u32(&mut buf, opt + 60, TEXT_OFFSET as u32);
        put_u16(&mut buf, opt + 68, 10);
        put_u32(&mut buf, opt + 92, 16);

        let section = opt + 224;
        buf[section..section + 5].copy_from_slice(b".text");
        put_u32(&mut buf, section + 8, TEXT_SIZE as u32);
        put_u32(&mut buf, section + 12, 0x1000);
        put_u32(&mut buf, section + 16, TEXT_SIZE as u32);
        put_u32(&mut buf, section + 20, TEXT_OFFSET as u32);

        for (i, b) in buf[TEXT_OFFSET..].iter_mut().enumerate() {
            *b = (i * 7) as u8;
        }
        buf.extend_from_slice(trailing);
        buf
    }

    /// Rename the first section to `name` through a `/4` reference into a
    /// COFF string table appended to `image`.
    pub fn with_long_section_name(mut image: Vec<u8>, name: &str) -> Vec<u8> {
        let pe = 0x40;
        let strtab = image.len();
        put_u32(&mut image, pe + 12, strtab as u32);
        let section = pe + 24 + 224;
        image[section..section + 8].copy_from_slice(b"/4\0\0\0\0\0\0");

        let size = 4 + name.len() + 1;
        image.extend_from_slice(&(size as u32).to_le_bytes());
        image.extend_from_slice(name.as_bytes());
        image.push(0);
        image
    }
}
