use std::path::Path;

use repograph_vcs::git::GitCli;

/// Create a git repository at `dir` on branch `main`, committing each `(path, content)` pair.
pub(crate) async fn init_origin(git: &GitCli, dir: &Path, files: &[(&str, &str)]) {
    std::fs::create_dir_all(dir).unwrap();
    git.run(Some(dir), &["init", "--quiet", "-b", "main"])
        .await
        .unwrap();
    for (path, content) in files {
        commit(git, dir, path, content).await;
    }
}

pub(crate) async fn commit(git: &GitCli, dir: &Path, path: &str, content: &str) {
    let full = dir.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&full, content).unwrap();
    git.run(Some(dir), &["add", "--", path]).await.unwrap();
    let message = format!("update {path}");
    git.run(
        Some(dir),
        &[
            "-c",
            "user.name=Fixture",
            "-c",
            "user.email=fixture@example.com",
            "commit",
            "--quiet",
            "-m",
            message.as_str(),
        ],
    )
    .await
    .unwrap();
}
