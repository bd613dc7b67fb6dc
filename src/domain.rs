use thiserror::Error;

use crate::challenge::ChallengeType;

/// 網域名稱驗證錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Domain name is empty")]
    Empty,
    #[error("Invalid domain name: {0}")]
    Invalid(String),
    #[error("Wildcard domain {0} can only be validated with dns-01")]
    WildcardRequiresDns01(String),
}

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// 驗證並正規化（去除空白、轉小寫）要申請的網域名稱。
///
/// 規則：至少兩個標籤；每個標籤 1 到 63 個字元，由英數字與中間的 `-` 組成；
/// 最後一個標籤至少兩個英文字母；`*.` 前綴只允許搭配 DNS-01。
pub fn validate_domain(domain: &str, method: &ChallengeType) -> Result<String, DomainError> {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return Err(DomainError::Empty);
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(DomainError::Invalid(domain));
    }

    let (wildcard, base) = match domain.strip_prefix("*.") {
        Some(rest) => (true, rest),
        None => (false, domain.as_str()),
    };

    let labels: Vec<&str> = base.split('.').collect();
    let Some((tld, rest)) = labels.split_last() else {
        return Err(DomainError::Invalid(domain.clone()));
    };
    if rest.is_empty()
        || !rest.iter().all(|label| is_valid_label(label))
        || tld.len() < 2
        || !tld.chars().all(|c| c.is_ascii_alphabetic())
    {
        return Err(DomainError::Invalid(domain.clone()));
    }

    if wildcard && *method != ChallengeType::Dns01 {
        return Err(DomainError::WildcardRequiresDns01(domain));
    }

    Ok(domain)
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
