mod mac;

pub use mac::MacAddr;
