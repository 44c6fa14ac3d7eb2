use chrono::{DateTime, Utc};
use mailparse::{MailAddr, MailHeader, MailHeaderMap};

use crate::content;
use crate::error::MailError;

/// An inbound message parsed from raw RFC 822 bytes.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: Option<String>,
    pub message_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    /// Top-level mimetype, lower-cased and without parameters.
    pub content_type: String,
    body: String,
}

impl MailMessage {
    pub fn parse(raw: Vec<u8>) -> Result<Self, MailError> {
        let parsed = mailparse::parse_mail(&raw)?;
        let headers = &parsed.headers;

        let from = address_list(headers.get_first_header("From"));
        let to = address_list(headers.get_first_header("To"));
        let cc = address_list(headers.get_first_header("Cc"));
        let subject = headers.get_first_value("Subject");
        let message_id = headers.get_first_value("Message-ID");
        let date = headers
            .get_first_value("Date")
            .and_then(|d| mailparse::dateparse(&d).ok())
            .and_then(|ts| DateTime::from_timestamp(ts, 0));
        let content_type = parsed.ctype.mimetype.to_ascii_lowercase();
        let body = content::plain_text_body(&parsed);

        Ok(Self {
            from,
            to,
            cc,
            subject,
            message_id,
            date,
            content_type,
            body,
        })
    }

    /// First `From` address, as written in the message.
    pub fn sender(&self) -> Option<&str> {
        self.from.first().map(String::as_str)
    }

    pub fn is_html(&self) -> bool {
        self.content_type == "text/html"
    }

    pub fn plain_text_body(&self) -> &str {
        &self.body
    }
}

fn address_list(header: Option<&MailHeader>) -> Vec<String> {
    let Some(header) = header else {
        return Vec::new();
    };
    match mailparse::addrparse_header(header) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(info) => vec![info.addr.clone()],
                MailAddr::Group(group) => group.addrs.iter().map(|i| i.addr.clone()).collect(),
            })
            .collect(),
        Err(_) => {
            let value = header.get_value();
            let value = value.trim();
            if value.is_empty() {
                Vec::new()
            } else {
                vec![value.to_string()]
            }
        }
    }
}
