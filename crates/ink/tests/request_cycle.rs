use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ink::{
    Area, Capabilities, DISMISS_BROADCAST_TOKEN_PARAM, DISMISS_NOTICE_PARAM, DISMISS_SCOPE_PARAM,
    HostError, HostServices, Ink, InkSettings, RequestContext, Response,
};
use ink_core::{ConfigError, Transport, TransportError, Url};
use ink_notices::{ActorId, NoticeKind, ScopeKind};
use ink_platform::AppPaths;
use ink_store::{ManualClock, MemoryStore};
use serde_json::json;
use tempfile::TempDir;

const CATALOG_URL: &str = "https://updates.example.com/catalog.json";
const ARCHIVE_URL: &str = "https://updates.example.com/gallery-1.2.0.zip";
const LANDING_URL: &str = "https://site.example.com/admin/";

struct FakeTransport {
    catalog: Vec<u8>,
    archive: Vec<u8>,
    catalog_calls: AtomicUsize,
    downloads: AtomicUsize,
}

impl FakeTransport {
    fn offering(version: &str) -> Self {
        Self {
            catalog: format!(r#"{{"1.0.0": {{"version": "{version}", "url": "{ARCHIVE_URL}"}}}}"#)
                .into_bytes(),
            archive: plugin_archive(version),
            catalog_calls: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if url == CATALOG_URL {
            self.catalog_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.catalog.clone())
        } else {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            Ok(self.archive.clone())
        }
    }
}

fn plugin_header(version: &str) -> String {
    format!("<?php\n/*\n * Plugin Name: Gallery\n * Version: {version}\n */\n")
}

fn plugin_archive(version: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
    writer
        .start_file("gallery/gallery.php", options)
        .expect("file entry should be started");
    writer
        .write_all(plugin_header(version).as_bytes())
        .expect("file entry should be written");
    writer
        .finish()
        .expect("zip archive should be finalized")
        .into_inner()
}

struct Site {
    _temp: TempDir,
    paths: AppPaths,
    content: PathBuf,
    product_file: PathBuf,
    cache: Arc<MemoryStore>,
    transport: Arc<FakeTransport>,
    clock: Arc<ManualClock>,
}

impl Site {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let content = temp.path().join("content");
        let product_file = content.join("plugins/gallery/gallery.php");
        std::fs::create_dir_all(product_file.parent().expect("product file should have a parent"))
            .expect("plugin dir should be created");
        std::fs::write(&product_file, plugin_header("1.0.0")).expect("product file should be written");

        let clock = Arc::new(ManualClock::default());
        Self {
            paths: AppPaths::rooted_at(&temp.path().join("state")),
            cache: Arc::new(MemoryStore::with_clock(clock.clone())),
            transport: Arc::new(FakeTransport::offering("1.2.0")),
            clock,
            content,
            product_file,
            _temp: temp,
        }
    }

    fn settings(&self) -> InkSettings {
        serde_json::from_value(json!({
            "secret": "request-cycle-test-secret",
            "landing_url": LANDING_URL,
            "content_dir": self.content,
            "updater": {
                "endpoint": CATALOG_URL,
                "product_file": self.product_file,
                "product_name": "Gallery",
                "product_kind": "plugin"
            }
        }))
        .expect("settings should deserialize")
    }

    fn services(&self) -> HostServices {
        HostServices {
            cache: self.cache.clone(),
            settings: Arc::new(MemoryStore::with_clock(self.clock.clone())),
            transport: self.transport.clone(),
            clock: self.clock.clone(),
        }
    }

    fn ink(&self, settings: &InkSettings) -> Ink {
        Ink::new(settings, &self.paths, self.services()).expect("host should start")
    }

    fn installed_version_line(&self) -> String {
        installed_version_line(&self.product_file)
    }
}

fn installed_version_line(product_file: &Path) -> String {
    std::fs::read_to_string(product_file)
        .expect("product file should be readable")
        .lines()
        .find(|line| line.contains("Version:"))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn admin_request(url: &str) -> RequestContext {
    RequestContext::new(Area::Admin, Url::parse(url).expect("url should parse"))
        .with_actor(ActorId::from(1), Capabilities::administrator())
        .with_screen("plugins")
}

#[tokio::test]
async fn notice_link_applies_the_update_and_redirects() {
    let site = Site::new();
    let ink = site.ink(&site.settings());

    let mut first = admin_request("https://site.example.com/admin/plugins.php?page=gallery");
    ink.handle(&mut first).await;
    assert!(first.response().is_none());

    let notice = first
        .notices
        .iter()
        .find(|notice| notice.text.starts_with("An update (v1.2.0) is available for Gallery."))
        .expect("the availability notice should be rendered");
    assert_eq!(notice.kind, NoticeKind::Info);
    assert!(!notice.dismissible);
    let (_, link) = notice
        .text
        .rsplit_once("Apply the update: ")
        .expect("the notice should carry an action link");

    let mut follow = admin_request(link);
    ink.handle(&mut follow).await;
    assert_eq!(
        follow.response(),
        Some(&Response::Redirect(
            Url::parse(LANDING_URL).expect("url should parse")
        ))
    );
    assert!(follow.notices.is_empty(), "a redirect ends the request");
    assert_eq!(site.installed_version_line(), "* Version: 1.2.0");
    assert_eq!(site.transport.downloads.load(Ordering::SeqCst), 1);
    assert_eq!(site.transport.catalog_calls.load(Ordering::SeqCst), 1);

    let mut landing = admin_request(LANDING_URL);
    ink.handle(&mut landing).await;
    let success = landing
        .notices
        .iter()
        .find(|notice| notice.kind == NoticeKind::Success)
        .expect("the success notice should be rendered after the redirect");
    assert_eq!(success.text, "Gallery: update v1.2.0 successfully applied.");
    assert_eq!(success.scope, ScopeKind::Broadcast);
    assert!(success.dismissible);
}

#[tokio::test]
async fn replayed_link_after_apply_does_nothing() {
    let site = Site::new();
    let ink = site.ink(&site.settings());
    let pipeline = ink.pipeline().expect("updater should be armed");
    let link = pipeline.action_link(
        &Url::parse(LANDING_URL).expect("url should parse"),
        Some(&ActorId::from(1)),
    );

    let mut first = admin_request(link.as_str());
    ink.handle(&mut first).await;
    assert!(matches!(first.response(), Some(Response::Redirect(_))));

    let mut replay = admin_request(link.as_str());
    ink.handle(&mut replay).await;
    assert!(replay.response().is_none());
    assert_eq!(site.transport.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn configuration_errors_are_shown_and_disarm_the_updater() {
    let site = Site::new();
    let mut settings = site.settings();
    settings.content_dir = Some(site.content.join("missing"));
    if let Some(updater) = settings.updater.as_mut() {
        updater.endpoint = String::new();
    }
    let ink = site.ink(&settings);
    assert!(ink.pipeline().is_none());

    let mut request = admin_request(LANDING_URL);
    ink.handle(&mut request).await;
    let texts: Vec<&str> = request.notices.iter().map(|notice| notice.text.as_str()).collect();
    assert!(texts.contains(&"[Ink][Init] Invalid configuration. Please set up the update endpoint."));
    assert!(
        texts
            .iter()
            .any(|text| text.starts_with("[Ink][Init] Invalid configuration. The content directory"))
    );
    assert_eq!(site.transport.catalog_calls.load(Ordering::SeqCst), 0);

    let mut member = RequestContext::new(Area::Admin, Url::parse(LANDING_URL).expect("url should parse"))
        .with_actor(ActorId::from(9), Capabilities::member());
    ink.handle(&mut member).await;
    assert!(member.notices.is_empty());
}

#[test]
fn weak_secret_refuses_to_start() {
    let site = Site::new();
    let mut settings = site.settings();
    settings.secret = "short".to_string();

    let result = Ink::new(&settings, &site.paths, site.services());
    assert!(matches!(
        result,
        Err(HostError::Config(ConfigError::WeakSecret))
    ));
}

#[tokio::test]
async fn background_dismiss_removes_the_notice() {
    let site = Site::new();
    let ink = site.ink(&InkSettings {
        secret: "request-cycle-test-secret".to_string(),
        ..InkSettings::default()
    });
    let hash = ink
        .notices()
        .broadcast()
        .add("Something needs attention.", NoticeKind::Warning, true)
        .expect("notice should be stored");

    let page = admin_request(LANDING_URL);
    let token = ink
        .notices()
        .dismiss_config(&page)
        .into_iter()
        .find(|config| config.scope == ScopeKind::Broadcast)
        .expect("administrators should get a broadcast dismiss token")
        .token;

    let background = |token: &str| {
        RequestContext::new(
            Area::Background,
            Url::parse("https://site.example.com/ajax").expect("url should parse"),
        )
        .with_actor(ActorId::from(1), Capabilities::administrator())
        .with_param(DISMISS_NOTICE_PARAM, hash.clone())
        .with_param(DISMISS_SCOPE_PARAM, "admin")
        .with_param(DISMISS_BROADCAST_TOKEN_PARAM, token)
    };

    let mut forged = background("not-a-token");
    ink.handle(&mut forged).await;
    assert_eq!(
        forged.response(),
        Some(&Response::Json(json!({ "success": false })))
    );
    assert!(ink.notices().broadcast().contains(&hash).expect("contains"));

    let mut valid = background(&token);
    ink.handle(&mut valid).await;
    assert_eq!(
        valid.response(),
        Some(&Response::Json(json!({ "success": true })))
    );
    assert!(!ink.notices().broadcast().contains(&hash).expect("contains"));
}

#[tokio::test]
async fn maintenance_halts_unprivileged_front_requests() {
    let site = Site::new();
    let ink = site.ink(&site.settings());
    let gate = ink
        .pipeline()
        .expect("updater should be armed")
        .maintenance_gate()
        .clone();
    let front = || {
        RequestContext::new(
            Area::Front,
            Url::parse("https://site.example.com/gallery").expect("url should parse"),
        )
    };

    let guard = gate.engage();

    let mut visitor = front();
    ink.handle(&mut visitor).await;
    match visitor.response() {
        Some(Response::Halt { status, message }) => {
            assert_eq!(*status, 503);
            assert!(message.starts_with("Gallery is under maintenance."));
        }
        other => panic!("visitor should be halted, got {other:?}"),
    }

    let mut admin = front().with_actor(ActorId::from(1), Capabilities::administrator());
    ink.handle(&mut admin).await;
    assert!(admin.response().is_none());

    drop(guard);
    let mut later = front();
    ink.handle(&mut later).await;
    assert!(later.response().is_none());
}
