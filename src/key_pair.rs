use std::string::FromUtf8Error;

use openssl::{
    error::ErrorStack,
    pkey::{Id, PKey, Private, Public},
    rsa::Rsa,
};
use thiserror::Error;
use tracing::debug;

use crate::jwk::{Jwk, JwkError};

/// 金鑰相關操作的錯誤列舉。
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("OpenSSL error: {0}")]
    OpenSSL(#[from] ErrorStack),
    #[error("Unsupported key algorithm, only RSA is supported")]
    UnsupportedAlgorithm,
    #[error("RSA key size {0} is below the 2048-bit minimum")]
    KeyTooSmall(u32),
    #[error("PEM is not valid UTF-8: {0}")]
    InvalidPem(#[from] FromUtf8Error),
    #[error("JWK error: {0}")]
    Jwk(#[from] JwkError),
}

type Result<T> = std::result::Result<T, KeyError>;

/// RSA 非對稱金鑰對。
///
/// 帳戶金鑰（2048 位元）與網域金鑰（4096 位元）共用此型別；
/// 兩者的生命週期不同：帳戶金鑰隨帳戶持久化，網域金鑰每次申請都重新產生。
#[derive(Debug)]
pub struct KeyPair {
    /// 私鑰。
    pub pri_key: PKey<Private>,
    /// 由私鑰派生的公鑰。
    pub pub_key: PKey<Public>,
}

impl KeyPair {
    /// 帳戶金鑰的預設長度。
    pub const ACCOUNT_KEY_BITS: u32 = 2048;
    /// 網域（憑證）金鑰的預設長度。
    pub const DOMAIN_KEY_BITS: u32 = 4096;
    const MIN_BITS: u32 = 2048;

    /// 產生一組新的 RSA 金鑰對。
    ///
    /// # 錯誤
    ///
    /// 長度小於 2048 位元時回傳 [`KeyError::KeyTooSmall`]。
    pub fn generate(bits: u32) -> Result<Self> {
        if bits < Self::MIN_BITS {
            return Err(KeyError::KeyTooSmall(bits));
        }
        debug!(bits, "generating RSA key pair");
        let pri_key = PKey::from_rsa(Rsa::generate(bits)?)?;
        let pub_key = Self::derive_public_key(&pri_key)?;
        Ok(Self { pri_key, pub_key })
    }

    /// 根據 PEM 格式（PKCS#1 或 PKCS#8）的私鑰建立金鑰對。
    pub fn from_pem(pri_key_pem: &[u8]) -> Result<Self> {
        let pri_key = PKey::private_key_from_pem(pri_key_pem)?;
        let pub_key = Self::derive_public_key(&pri_key)?;
        Ok(Self { pri_key, pub_key })
    }

    /// 匯出 PKCS#8 PEM 格式的私鑰。
    pub fn private_key_pem(&self) -> Result<String> {
        Ok(String::from_utf8(self.pri_key.private_key_to_pem_pkcs8()?)?)
    }

    /// 金鑰長度（位元）。
    pub fn bits(&self) -> u32 {
        self.pri_key.bits()
    }

    /// 帳戶公鑰的 JWK。
    pub fn jwk(&self) -> Result<Jwk> {
        Ok(Jwk::from_key_pair(self)?)
    }

    /// RFC 7638 JWK thumbprint（base64url 編碼）。
    pub fn thumbprint(&self) -> Result<String> {
        Ok(self.jwk()?.thumbprint()?)
    }

    fn derive_public_key(pri_key: &PKey<Private>) -> Result<PKey<Public>> {
        match pri_key.id() {
            Id::RSA => {
                let rsa = pri_key.rsa()?;
                let pub_rsa =
                    Rsa::from_public_components(rsa.n().to_owned()?, rsa.e().to_owned()?)?;
                Ok(PKey::from_rsa(pub_rsa)?)
            }
            _ => Err(KeyError::UnsupportedAlgorithm),
        }
    }
}
