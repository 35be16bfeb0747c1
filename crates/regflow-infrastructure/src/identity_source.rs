//! Identity sources: `email:password` lists and generated identities.

use rand::Rng;
use rand::seq::SliceRandom;
use regflow_core::config::IdentityConfig;
use regflow_core::error::{RegflowError, Result};
use regflow_core::identity::{Identity, MailboxCredentials};
use std::fs;
use std::path::Path;

/// One `email:password` entry of an identity list.
#[derive(Clone, PartialEq, Eq)]
pub struct ListedIdentity {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for ListedIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListedIdentity")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdentityList {
    pub entries: Vec<ListedIdentity>,
    pub skipped: usize,
}

/// Parses `email:password` lines. Blank lines are ignored; anything else
/// that does not split into an address and a non-empty password is skipped.
pub fn parse_identities(content: &str) -> IdentityList {
    let mut list = IdentityList::default();

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(entry) => list.entries.push(entry),
            None => {
                tracing::warn!(line = index + 1, "Skipping malformed identity line");
                list.skipped += 1;
            }
        }
    }

    list
}

fn parse_line(line: &str) -> Option<ListedIdentity> {
    let (email, password) = line.split_once(':')?;
    let email = email.trim();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() || password.is_empty() {
        return None;
    }
    Some(ListedIdentity {
        email: email.to_string(),
        password: password.to_string(),
    })
}

pub fn load_identities(path: &Path) -> Result<IdentityList> {
    let content = fs::read_to_string(path)?;
    let list = parse_identities(&content);
    tracing::info!(
        "Loaded {} identities from {:?} ({} skipped)",
        list.entries.len(),
        path,
        list.skipped
    );
    Ok(list)
}

/// Builds identities from configured name lists and domains.
#[derive(Debug, Clone)]
pub struct IdentityFactory {
    first_names: Vec<String>,
    last_names: Vec<String>,
    domains: Vec<String>,
}

impl IdentityFactory {
    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        let clean = |values: &[String]| -> Vec<String> {
            values
                .iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        };
        let factory = Self {
            first_names: clean(&config.first_names),
            last_names: clean(&config.last_names),
            domains: clean(&config.domains),
        };
        if factory.first_names.is_empty() || factory.last_names.is_empty() {
            return Err(RegflowError::config(
                "identity.first_names and identity.last_names must not be empty",
            ));
        }
        Ok(factory)
    }

    /// Generates a fresh identity `first+last+NNNN@domain`, all lowercase.
    pub fn generate(&self) -> Result<Identity> {
        self.generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Identity> {
        let domain = self
            .domains
            .choose(rng)
            .ok_or_else(|| RegflowError::config("no identity.domains configured"))?;
        let (first, last) = self.pick_name(rng);
        let number: u16 = rng.gen_range(1000..=9999);

        let email = format!("{}{}{}@{}", first, last, number, domain).to_lowercase();
        Ok(Identity::new(email, format!("{} {}", first, last)))
    }

    /// Turns a listed entry into an identity that reads codes from its own
    /// mailbox. The display name is drawn from the name lists.
    pub fn for_listed(&self, entry: &ListedIdentity) -> Identity {
        let (first, last) = self.pick_name(&mut rand::thread_rng());
        Identity::new(entry.email.clone(), format!("{} {}", first, last))
            .with_mailbox(MailboxCredentials::new(
                entry.email.clone(),
                entry.password.clone(),
            ))
    }

    fn pick_name<R: Rng + ?Sized>(&self, rng: &mut R) -> (&str, &str) {
        let first = self
            .first_names
            .choose(rng)
            .map(String::as_str)
            .unwrap_or_default();
        let last = self
            .last_names
            .choose(rng)
            .map(String::as_str)
            .unwrap_or_default();
        (first, last)
    }
}
