use crate::models::DirectoryNode;
use std::fmt;

/// Target stack selected by the user. Unknown tags fall back to a static site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    None,
    React,
    Vue,
    Angular,
    Next,
}

impl Platform {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "react" => Platform::React,
            "vue" => Platform::Vue,
            "angular" => Platform::Angular,
            "next" | "nextjs" | "next.js" => Platform::Next,
            _ => Platform::None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Platform::None => "none",
            Platform::React => "react",
            Platform::Vue => "vue",
            Platform::Angular => "angular",
            Platform::Next => "next",
        }
    }

    /// Human phrasing used inside prompts.
    pub fn describe(self) -> &'static str {
        match self {
            Platform::None => "plain HTML, CSS and JavaScript (no framework)",
            Platform::React => "React",
            Platform::Vue => "Vue.js",
            Platform::Angular => "Angular",
            Platform::Next => "Next.js",
        }
    }

    /// Starter tree merged under whatever the model proposes.
    pub fn baseline(self) -> DirectoryNode {
        use DirectoryNode as N;
        let children = match self {
            Platform::None => vec![N::dir(
                "src",
                vec![
                    N::file("index.html", "Main HTML file with Tailwind CSS setup"),
                    N::file("style.css", "Custom styles (if needed beyond Tailwind)"),
                    N::file("script.js", "JavaScript functionality"),
                ],
            )],
            Platform::React => vec![
                N::dir(
                    "public",
                    vec![
                        N::file("index.html", "Main HTML file"),
                        N::file("favicon.ico", "Website favicon"),
                        N::file("manifest.json", "PWA manifest"),
                        N::file("robots.txt", "Search engine instructions"),
                    ],
                ),
                N::dir(
                    "src",
                    vec![
                        N::dir(
                            "assets",
                            vec![N::dir("images", vec![]), N::dir("styles", vec![])],
                        ),
                        N::dir(
                            "components",
                            vec![
                                N::file("Header.js", "Header component"),
                                N::file("Footer.js", "Footer component"),
                                N::file("Sidebar.js", "Sidebar component"),
                            ],
                        ),
                        N::dir(
                            "pages",
                            vec![
                                N::file("Home.js", "Home page"),
                                N::file("About.js", "About page"),
                            ],
                        ),
                        N::file("App.js", "Main App component"),
                        N::file("index.js", "Entry point"),
                        N::file("styles.css", "Global styles"),
                    ],
                ),
                N::file(".gitignore", "Git ignore file"),
                N::file("package.json", "Project configuration"),
                N::file("README.md", "Project documentation"),
            ],
            Platform::Vue => vec![
                N::dir(
                    "src",
                    vec![
                        N::dir("components", vec![]),
                        N::dir("views", vec![]),
                        N::dir(
                            "assets",
                            vec![N::dir("styles", vec![]), N::dir("images", vec![])],
                        ),
                        N::dir("router", vec![N::file("index.js", "Route definitions")]),
                        N::dir("store", vec![N::file("index.js", "Application state store")]),
                        N::file("App.vue", "Root component"),
                        N::file("main.js", "Entry point that mounts the app"),
                    ],
                ),
                N::dir(
                    "public",
                    vec![
                        N::file("index.html", "Main HTML file"),
                        N::file("favicon.ico", "Website favicon"),
                    ],
                ),
                N::file("package.json", "Project configuration"),
            ],
            Platform::Angular => vec![
                N::dir(
                    "src",
                    vec![N::dir(
                        "app",
                        vec![
                            N::dir("components", vec![]),
                            N::dir("pages", vec![]),
                            N::dir(
                                "services",
                                vec![N::file("api.service.ts", "HTTP API service")],
                            ),
                            N::file("app.component.ts", "Root component class"),
                            N::file("app.component.html", "Root component template"),
                            N::file("app.component.css", "Root component styles"),
                            N::file("app.module.ts", "Root module"),
                            N::file("app-routing.module.ts", "Route configuration"),
                        ],
                    )],
                ),
                N::file("angular.json", "Angular workspace configuration"),
                N::file("package.json", "Project configuration"),
                N::file("tsconfig.json", "TypeScript configuration"),
                N::file("README.md", "Project documentation"),
                N::file(".gitignore", "Git ignore file"),
            ],
            Platform::Next => vec![
                N::dir(
                    "src",
                    vec![
                        N::dir(
                            "app",
                            vec![
                                N::file("layout.tsx", "Root layout"),
                                N::file("page.tsx", "Home page"),
                            ],
                        ),
                        N::dir("components", vec![]),
                        N::dir("lib", vec![]),
                        N::dir("styles", vec![N::file("globals.css", "Global styles")]),
                    ],
                ),
                N::dir("public", vec![]),
                N::file("next.config.js", "Next.js configuration"),
                N::file("package.json", "Project configuration"),
                N::file("tsconfig.json", "TypeScript configuration"),
            ],
        };
        N::dir("root", children)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_system::flatten;

    #[test]
    fn unknown_tags_fall_back_to_static_site() {
        assert_eq!(Platform::from_tag("React"), Platform::React);
        assert_eq!(Platform::from_tag("svelte"), Platform::None);
        assert_eq!(Platform::from_tag(""), Platform::None);
    }

    #[test]
    fn static_site_baseline_has_three_files() {
        let paths: Vec<_> = flatten(&Platform::None.baseline())
            .into_iter()
            .map(|f| f.path)
            .collect();
        assert_eq!(
            paths,
            vec!["root/src/index.html", "root/src/style.css", "root/src/script.js"]
        );
    }

    #[test]
    fn every_baseline_is_rooted_and_non_empty() {
        for platform in [
            Platform::None,
            Platform::React,
            Platform::Vue,
            Platform::Angular,
            Platform::Next,
        ] {
            let baseline = platform.baseline();
            assert_eq!(baseline.name(), "root");
            assert!(!flatten(&baseline).is_empty(), "{} baseline is empty", platform);
        }
    }
}
