pub mod archive;
pub mod gpg;
pub mod remote;

pub use archive::{ArchiveMode, Archiver, TarArchiver};
pub use gpg::{Encryptor, GpgEncryptor};
pub use remote::{RemoteShell, SshShell};
