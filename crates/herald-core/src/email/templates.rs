//! Waitlist email templates.
//!
//! Pure functions: no store or network access. Subject, text and html are
//! rendered from the same formatted values, so the variants never disagree
//! on position, total or message.

use chrono::{Datelike, Utc};

use super::format::{escape_html, format_thousands};
use crate::domain::{EmailTemplate, UpdateEmailData, WelcomeEmailData};

const STYLE: &str = "\
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; margin: 0; padding: 0; background-color: #f8f9fa; }
.container { max-width: 600px; margin: 0 auto; background: white; border-radius: 8px; overflow: hidden; box-shadow: 0 4px 6px rgba(0, 0, 0, 0.1); }
.header { background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; padding: 40px 30px; text-align: center; }
.header h1 { margin: 0; font-size: 30px; font-weight: 700; }
.content { padding: 40px 30px; }
.position-badge { display: inline-block; background: #667eea; color: white; padding: 8px 16px; border-radius: 20px; font-weight: 600; font-size: 18px; margin: 20px 0; }
.update-message { background: #f8f9fa; padding: 20px; border-radius: 6px; margin: 20px 0; border-left: 4px solid #667eea; }
.cta-button { display: inline-block; background: #667eea; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; font-weight: 600; margin: 20px 0; }
.footer { background: #f8f9fa; padding: 30px; text-align: center; color: #666; font-size: 14px; }";

const PERKS: [&str; 4] = [
    "Early access to the beta release",
    "Priority support and direct feedback channel",
    "Exclusive founding member benefits",
    "Regular updates on our progress",
];

/// Branding for the waitlist emails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitlistTemplates {
    pub product_name: String,
    pub site_url: String,
    pub copyright_year: i32,
}

impl Default for WaitlistTemplates {
    fn default() -> Self {
        Self {
            product_name: "Aela".to_string(),
            site_url: "https://aela.app".to_string(),
            copyright_year: Utc::now().year(),
        }
    }
}

impl WaitlistTemplates {
    pub fn welcome(&self, data: &WelcomeEmailData) -> EmailTemplate {
        let product = &self.product_name;
        let position = format_thousands(data.position);
        let total = format_thousands(data.total_count);

        let subject = format!("Welcome to {product}! You're #{position} on the waitlist");

        let perks_text: String = PERKS.iter().map(|p| format!("- {p}\n")).collect();
        let text = format!(
            "Welcome to {product}!\n\
             \n\
             You're now on the waitlist for the future of note-taking.\n\
             \n\
             Position: #{position}\n\
             Total waitlist: {total} people\n\
             \n\
             What to expect:\n\
             {perks_text}\
             \n\
             We'll keep you updated on our progress and let you know as soon as {product} is ready for you to try.\n\
             \n\
             Visit us at: {site}\n\
             \n\
             Thanks for your interest in {product}!\n\
             \n\
             {copyright}\n",
            site = self.site_url,
            copyright = self.copyright_text(),
        );

        let product_html = escape_html(product);
        let perks_html: String = PERKS
            .iter()
            .map(|p| format!("<li>{}</li>", escape_html(p)))
            .collect();
        let body = format!(
            "<h2>You're in!</h2>\
             <p>Thanks for joining the {product_html} waitlist. We're excited to have you on this journey with us.</p>\
             {badge}\
             <h3>What to expect:</h3>\
             <ul>{perks_html}</ul>\
             <p>We'll keep you updated on our progress and let you know as soon as {product_html} is ready for you to try.</p>\
             <div style=\"text-align: center;\"><a href=\"{site}\" class=\"cta-button\">Visit {product_html}</a></div>",
            badge = position_badge(&position, &total),
            site = escape_html(&self.site_url),
        );
        let html = self.layout(
            &format!("Welcome to {product}"),
            &format!("Welcome to {product}!"),
            "You're now on the waitlist for the future of note-taking",
            &body,
            &format!("Thanks for your interest in {product}!"),
        );

        EmailTemplate {
            subject,
            text,
            html,
        }
    }

    pub fn update(&self, data: &UpdateEmailData) -> EmailTemplate {
        let product = &self.product_name;
        let position = format_thousands(data.position);
        let total = format_thousands(data.total_count);
        let message = data
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());

        let subject = format!("{product} Update: You're now #{position} on the waitlist");

        let message_text = message
            .map(|m| format!("Update: {m}\n\n"))
            .unwrap_or_default();
        let text = format!(
            "{product} Waitlist Update\n\
             \n\
             Your waitlist position has been updated!\n\
             \n\
             Position: #{position}\n\
             Total waitlist: {total} people\n\
             \n\
             {message_text}\
             We're working hard to get {product} ready for you. Stay tuned for more updates!\n\
             \n\
             Thanks for your patience!\n\
             \n\
             {copyright}\n",
            copyright = self.copyright_text(),
        );

        let message_html = message
            .map(|m| {
                format!(
                    "<div class=\"update-message\"><strong>Update:</strong> {}</div>",
                    escape_html(m)
                )
            })
            .unwrap_or_default();
        let body = format!(
            "<h2>Position Update</h2>\
             <p>Your position on the {product_html} waitlist has been updated.</p>\
             {badge}\
             {message_html}\
             <p>We're working hard to get {product_html} ready for you. Stay tuned for more updates!</p>",
            product_html = escape_html(product),
            badge = position_badge(&position, &total),
        );
        let html = self.layout(
            &format!("{product} Waitlist Update"),
            &format!("{product} Update"),
            "Your waitlist position has been updated",
            &body,
            "Thanks for your patience!",
        );

        EmailTemplate {
            subject,
            text,
            html,
        }
    }

    fn copyright_text(&self) -> String {
        format!(
            "\u{a9} {} {}. All rights reserved.",
            self.copyright_year, self.product_name
        )
    }

    fn layout(&self, title: &str, heading: &str, tagline: &str, body: &str, thanks: &str) -> String {
        format!(
            "<!DOCTYPE html>\n\
             <html>\n\
             <head>\n\
             <meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
             <title>{title}</title>\n\
             <style>\n{STYLE}\n</style>\n\
             </head>\n\
             <body>\n\
             <div class=\"container\">\n\
             <div class=\"header\"><h1>{heading}</h1><p>{tagline}</p></div>\n\
             <div class=\"content\">{body}</div>\n\
             <div class=\"footer\"><p>{thanks}</p><p>{copyright}</p></div>\n\
             </div>\n\
             </body>\n\
             </html>\n",
            title = escape_html(title),
            heading = escape_html(heading),
            tagline = escape_html(tagline),
            thanks = escape_html(thanks),
            copyright = escape_html(&self.copyright_text()),
        )
    }
}

/// Position values are pre-formatted digits and commas, safe for html.
fn position_badge(position: &str, total: &str) -> String {
    format!(
        "<div style=\"text-align: center;\">\
         <div class=\"position-badge\">Position #{position}</div>\
         <p>Out of {total} people waiting</p>\
         </div>"
    )
}

/// Welcome email with the default branding.
pub fn generate_waitlist_welcome_email(data: &WelcomeEmailData) -> EmailTemplate {
    WaitlistTemplates::default().welcome(data)
}

/// Position update email with the default branding.
pub fn generate_waitlist_update_email(data: &UpdateEmailData) -> EmailTemplate {
    WaitlistTemplates::default().update(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn templates() -> WaitlistTemplates {
        WaitlistTemplates {
            copyright_year: 2024,
            ..WaitlistTemplates::default()
        }
    }

    fn welcome(position: u64, total_count: u64) -> WelcomeEmailData {
        WelcomeEmailData {
            email: "a@b.com".into(),
            position,
            total_count,
        }
    }

    fn update(message: Option<&str>) -> UpdateEmailData {
        UpdateEmailData {
            email: "a@b.com".into(),
            position: 42,
            total_count: 1_500,
            message: message.map(str::to_string),
        }
    }

    #[test]
    fn welcome_text_contains_position_and_total() {
        let email = generate_waitlist_welcome_email(&welcome(5, 100));

        assert_eq!(email.subject, "Welcome to Aela! You're #5 on the waitlist");
        assert!(email.text.contains("Position: #5"));
        assert!(email.text.contains("Total waitlist: 100 people"));
        assert!(email.text.contains("Visit us at: https://aela.app"));
    }

    #[rstest]
    #[case::small(5, 100, "#5", "100 people")]
    #[case::thousands(1_234, 56_789, "#1,234", "56,789 people")]
    #[case::millions(1, 2_000_000, "#1", "2,000,000 people")]
    fn welcome_formats_numbers_in_every_variant(
        #[case] position: u64,
        #[case] total: u64,
        #[case] position_str: &str,
        #[case] total_str: &str,
    ) {
        let email = templates().welcome(&welcome(position, total));

        assert!(email.subject.contains(position_str));
        assert!(email.text.contains(position_str));
        assert!(email.text.contains(total_str));
        assert!(email.html.contains(&format!("Position {position_str}")));
        assert!(email.html.contains(&format!("Out of {total_str} waiting")));
    }

    #[rstest]
    #[case::welcome(templates().welcome(&welcome(5, 100)))]
    #[case::update_with_message(templates().update(&update(Some("hello"))))]
    #[case::update_without_message(templates().update(&update(None)))]
    fn no_template_syntax_survives(#[case] email: EmailTemplate) {
        for part in [&email.subject, &email.text, &email.html] {
            assert!(!part.contains("${"));
            assert!(!part.contains("{{"));
            assert!(!part.contains("}}"));
        }
        assert!(email.text.contains("\u{a9} 2024 Aela. All rights reserved."));
    }

    #[test]
    fn update_includes_message_in_both_variants() {
        let email = templates().update(&update(Some("Beta opens Monday")));

        assert_eq!(email.subject, "Aela Update: You're now #42 on the waitlist");
        assert!(email.text.contains("Update: Beta opens Monday"));
        assert!(email.html.contains("<strong>Update:</strong> Beta opens Monday"));
        assert!(email.text.contains("Total waitlist: 1,500 people"));
    }

    #[test]
    fn update_without_message_omits_the_block() {
        let email = templates().update(&update(None));
        assert!(!email.text.contains("Update:"));
        assert!(!email.html.contains("update-message\">"));

        let blank = templates().update(&update(Some("   ")));
        assert_eq!(blank, email);
    }

    #[test]
    fn update_message_is_escaped_in_html_only() {
        let email = templates().update(&update(Some("<script>alert(1)</script> & more")));

        assert!(email.text.contains("Update: <script>alert(1)</script> & more"));
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;alert(1)&lt;/script&gt; &amp; more"));
    }

    #[test]
    fn branding_is_configurable() {
        let templates = WaitlistTemplates {
            product_name: "Nimbus".into(),
            site_url: "https://nimbus.example".into(),
            copyright_year: 2030,
        };
        let email = templates.welcome(&welcome(1, 1));

        assert!(email.subject.starts_with("Welcome to Nimbus!"));
        assert!(email.text.contains("https://nimbus.example"));
        assert!(email.html.contains("\u{a9} 2030 Nimbus."));
    }
}
