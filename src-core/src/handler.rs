//! Per-keyword message handlers and the registry that selects them.
//!
//! An accepted message is routed by the first non-blank line of its plain-text
//! body, which names the target record: `lead Jane Doe`, `account: Acme`, and
//! so on. The handler registered for that keyword finds (or creates) the
//! record, checks the sender may touch it, and attaches the message.

use std::sync::Arc;

use crate::asset::{Asset, AssetKind, AssetStore, EmailActivity};
use crate::directory::{sender_has_permissions_for, Directory, User};
use crate::error::{ConfigError, HandlerError};
use crate::log::OperatorLog;
use crate::message::MailMessage;

// ── Handler seam ────────────────────────────────────────────────────────────

/// What the engine hands to a handler alongside an accepted message.
pub struct HandlerContext<'a> {
    pub uid: u32,
    pub sender: &'a User,
    pub log: &'a OperatorLog,
    directory: &'a dyn Directory,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        uid: u32,
        sender: &'a User,
        directory: &'a dyn Directory,
        log: &'a OperatorLog,
    ) -> Self {
        Self {
            uid,
            sender,
            log,
            directory,
        }
    }

    pub fn sender_has_permissions_for(&self, asset: &Asset) -> bool {
        sender_has_permissions_for(self.sender, asset, self.directory)
    }
}

/// Processes one validated message from a known sender. Called exactly once
/// per accepted message, before it is archived; an error turns the message
/// into a discard.
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, ctx: &HandlerContext<'_>, message: &MailMessage) -> Result<(), HandlerError>;
}

// ── Keyword line ────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub struct KeywordLine<'a> {
    pub kind: AssetKind,
    pub name: &'a str,
    /// Body text after the keyword line.
    pub rest: String,
}

impl<'a> KeywordLine<'a> {
    pub fn parse(body: &'a str) -> Option<Self> {
        let mut lines = body.lines().skip_while(|l| l.trim().is_empty());
        let line = lines.next()?.trim();

        let end = line
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(line.len());
        let (word, tail) = line.split_at(end);
        if !tail.starts_with(|c: char| c == ':' || c.is_whitespace()) {
            return None;
        }
        let kind = word.parse().ok()?;
        let name = tail
            .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
            .trim_end();
        if name.is_empty() {
            return None;
        }

        let rest = lines.collect::<Vec<_>>().join("\n").trim().to_string();
        Some(Self { kind, name, rest })
    }
}

// ── Keyword handler ─────────────────────────────────────────────────────────

/// Attaches mail to one kind of CRM record.
pub struct KeywordHandler {
    kind: AssetKind,
    assets: Arc<dyn AssetStore>,
}

impl KeywordHandler {
    pub fn new(kind: AssetKind, assets: Arc<dyn AssetStore>) -> Self {
        Self { kind, assets }
    }
}

impl MessageHandler for KeywordHandler {
    fn name(&self) -> &str {
        self.kind.keyword()
    }

    fn process(&self, ctx: &HandlerContext<'_>, message: &MailMessage) -> Result<(), HandlerError> {
        let line = KeywordLine::parse(message.plain_text_body())
            .filter(|l| l.kind == self.kind)
            .ok_or(HandlerError::MissingKeyword)?;

        let asset = match self.assets.find(self.kind, line.name)? {
            Some(asset) => asset,
            None => {
                ctx.log.info(format_args!("{} \"{}\" not found, creating...", self.kind, line.name));
                self.assets.create(self.kind, line.name, ctx.sender.id)?
            }
        };

        if !ctx.sender_has_permissions_for(&asset) {
            return Err(HandlerError::PermissionDenied {
                kind: self.kind,
                name: asset.name,
            });
        }

        let activity = EmailActivity::new(&asset, ctx.sender.id, message, line.rest);
        self.assets.attach_email(activity)?;
        ctx.log.info(format_args!("attached message to {} \"{}\"", self.kind, asset.name));
        Ok(())
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Keyword → handler table. Routes each message to the handler registered for
/// the keyword its body starts with.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<(AssetKind, Box<dyn MessageHandler>)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry with a [`KeywordHandler`] for each configured keyword.
    /// An empty list enables every keyword.
    pub fn from_keywords<S: AsRef<str>>(
        keywords: &[S],
        assets: Arc<dyn AssetStore>,
    ) -> Result<Self, ConfigError> {
        let kinds = if keywords.is_empty() {
            AssetKind::ALL.to_vec()
        } else {
            keywords
                .iter()
                .map(|k| k.as_ref().parse())
                .collect::<Result<Vec<AssetKind>, _>>()?
        };

        let mut registry = Self::new();
        for kind in kinds {
            registry.register(kind, Box::new(KeywordHandler::new(kind, Arc::clone(&assets))));
        }
        Ok(registry)
    }

    /// Registers `handler` for `kind`, replacing any earlier registration.
    pub fn register(&mut self, kind: AssetKind, handler: Box<dyn MessageHandler>) {
        self.handlers.retain(|(k, _)| *k != kind);
        self.handlers.push((kind, handler));
    }

    pub fn kinds(&self) -> Vec<AssetKind> {
        self.handlers.iter().map(|(k, _)| *k).collect()
    }

    pub fn handler_for(&self, kind: AssetKind) -> Option<&dyn MessageHandler> {
        self.handlers
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, h)| h.as_ref())
    }
}

impl MessageHandler for HandlerRegistry {
    fn name(&self) -> &str {
        "keywords"
    }

    fn process(&self, ctx: &HandlerContext<'_>, message: &MailMessage) -> Result<(), HandlerError> {
        let kind = KeywordLine::parse(message.plain_text_body())
            .map(|l| l.kind)
            .ok_or(HandlerError::MissingKeyword)?;
        let handler = self.handler_for(kind).ok_or(HandlerError::MissingKeyword)?;
        handler.process(ctx, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Access;
    use crate::testing::{known_user, MemoryCrm};

    fn message(body: &str) -> MailMessage {
        let raw = format!(
            "From: owner@example.com\r\nTo: crm@example.com\r\nSubject: Notes\r\n\
             Message-ID: <n1@example.com>\r\n\r\n{}",
            body
        );
        MailMessage::parse(raw.into_bytes()).unwrap()
    }

    #[test]
    fn keyword_line_variants() {
        let line = KeywordLine::parse("\n\n  Lead: Jane Doe \nCalled today.\r\nFollow up.\n").unwrap();
        assert_eq!(line.kind, AssetKind::Lead);
        assert_eq!(line.name, "Jane Doe");
        assert_eq!(line.rest, "Called today.\nFollow up.");

        let line = KeywordLine::parse("account Acme Corp").unwrap();
        assert_eq!((line.kind, line.name, line.rest.as_str()), (AssetKind::Account, "Acme Corp", ""));

        assert_eq!(KeywordLine::parse("opportunity:Big deal").unwrap().name, "Big deal");
        assert!(KeywordLine::parse("leader board").is_none());
        assert!(KeywordLine::parse("lead").is_none());
        assert!(KeywordLine::parse("lead-in text").is_none());
        assert!(KeywordLine::parse("hello there").is_none());
        assert!(KeywordLine::parse("").is_none());
    }

    #[test]
    fn creates_missing_asset_and_attaches() {
        let crm = MemoryCrm::with_users(vec![known_user(1, "owner@example.com")]);
        let sender = known_user(1, "owner@example.com");
        let log = OperatorLog::new("test", true);
        let ctx = HandlerContext::new(9, &sender, &crm, &log);

        let handler = KeywordHandler::new(AssetKind::Lead, crm.clone_arc());
        handler.process(&ctx, &message("lead Jane Doe\r\nMet at the expo.")).unwrap();

        let data = crm.snapshot();
        let lead = data.find_asset(AssetKind::Lead, "jane doe").unwrap();
        assert_eq!(lead.user_id, Some(1));
        assert_eq!(data.activities.len(), 1);
        let activity = &data.activities[0];
        assert_eq!(activity.asset_id, lead.id);
        assert_eq!(activity.body, "Met at the expo.");
        assert_eq!(activity.sent_from, "owner@example.com");
        assert_eq!(activity.sent_to, vec!["crm@example.com"]);
        assert_eq!(activity.message_id.as_deref(), Some("<n1@example.com>"));
    }

    #[test]
    fn denies_private_asset_of_someone_else() {
        let crm = MemoryCrm::with_users(vec![known_user(1, "owner@example.com")]);
        crm.add_asset(AssetKind::Account, "Acme", Access::Private, Some(2));
        let sender = known_user(1, "owner@example.com");
        let log = OperatorLog::new("test", true);
        let ctx = HandlerContext::new(1, &sender, &crm, &log);

        let handler = KeywordHandler::new(AssetKind::Account, crm.clone_arc());
        let err = handler.process(&ctx, &message("account acme")).unwrap_err();
        assert!(matches!(err, HandlerError::PermissionDenied { kind: AssetKind::Account, .. }));
        assert!(crm.snapshot().activities.is_empty());
    }

    #[test]
    fn handler_rejects_other_keywords() {
        let crm = MemoryCrm::default();
        let sender = known_user(1, "owner@example.com");
        let log = OperatorLog::new("test", true);
        let ctx = HandlerContext::new(1, &sender, &crm, &log);

        let handler = KeywordHandler::new(AssetKind::Contact, crm.clone_arc());
        let err = handler.process(&ctx, &message("lead Jane")).unwrap_err();
        assert!(matches!(err, HandlerError::MissingKeyword));
    }

    #[test]
    fn registry_from_keywords() {
        let crm = MemoryCrm::default();
        let registry = HandlerRegistry::from_keywords(&["Lead", "account", "lead"], crm.clone_arc()).unwrap();
        assert_eq!(registry.kinds(), vec![AssetKind::Account, AssetKind::Lead]);
        assert_eq!(registry.handler_for(AssetKind::Lead).unwrap().name(), "lead");

        let all = HandlerRegistry::from_keywords::<&str>(&[], crm.clone_arc()).unwrap();
        assert_eq!(all.kinds(), AssetKind::ALL.to_vec());

        let err = HandlerRegistry::from_keywords(&["ticket"], crm.clone_arc()).err();
        assert_eq!(err, Some(ConfigError::UnknownKeyword("ticket".to_string())));
    }

    #[test]
    fn registry_routes_by_keyword() {
        let crm = MemoryCrm::with_users(vec![known_user(1, "owner@example.com")]);
        crm.add_asset(AssetKind::Contact, "Sam Lee", Access::Public, Some(5));
        let registry = HandlerRegistry::from_keywords(&["contact"], crm.clone_arc()).unwrap();
        let sender = known_user(1, "owner@example.com");
        let log = OperatorLog::new("test", true);
        let ctx = HandlerContext::new(1, &sender, &crm, &log);

        registry.process(&ctx, &message("contact Sam Lee\nThanks!")).unwrap();
        assert_eq!(crm.snapshot().activities[0].asset_kind, AssetKind::Contact);

        // Keyword present but not enabled.
        let err = registry.process(&ctx, &message("lead Jane")).unwrap_err();
        assert!(matches!(err, HandlerError::MissingKeyword));
        let err = registry.process(&ctx, &message("no keyword here")).unwrap_err();
        assert!(matches!(err, HandlerError::MissingKeyword));
    }
}
