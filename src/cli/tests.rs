#[cfg(test)]
mod tests {
    use crate::cli::{Args, Command};
    use crate::config::LLMProvider;
    use crate::ledger::{JobStatus, JobStore, JobUpdate};
    use clap::Parser;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_run_command_defaults() {
        let args = Args::try_parse_from(["researchmill", "run", "solid state batteries"]).unwrap();

        let Command::Run { topic, max_papers } = &args.command else {
            panic!("expected run command");
        };
        assert_eq!(topic, "solid state batteries");
        assert_eq!(*max_papers, 7);
        assert!(!args.verbose);
    }

    #[test]
    fn test_run_command_with_overrides() {
        let args = Args::try_parse_from([
            "researchmill",
            "run",
            "quantum error correction",
            "--max-papers",
            "3",
            "--llm-provider",
            "openai",
            "--model",
            "gpt-4o-mini",
            "--temperature",
            "0.2",
            "-v",
        ])
        .unwrap();

        let Command::Run { max_papers, .. } = &args.command else {
            panic!("expected run command");
        };
        assert_eq!(*max_papers, 3);

        let (_, config) = args.into_parts().unwrap();
        assert_eq!(config.llm.provider, LLMProvider::OpenAI);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.temperature, 0.2);
        assert!(config.verbose);
    }

    #[test]
    fn test_workspace_override_moves_internal_path() {
        let args = Args::try_parse_from([
            "researchmill",
            "jobs",
            "--workspace",
            "/data/research",
        ])
        .unwrap();

        let (_, config) = args.into_parts().unwrap();
        assert_eq!(config.workspace_path, PathBuf::from("/data/research"));
        assert_eq!(
            config.internal_path,
            PathBuf::from("/data/research/.researchmill")
        );
    }

    #[test]
    fn test_status_and_cleanup_commands() {
        let args = Args::try_parse_from(["researchmill", "status", "job-123"]).unwrap();
        assert!(matches!(args.command, Command::Status { ref job_id } if job_id == "job-123"));

        let args = Args::try_parse_from(["researchmill", "cleanup", "--hours", "48"]).unwrap();
        assert!(matches!(args.command, Command::Cleanup { hours: Some(48) }));

        let args = Args::try_parse_from(["researchmill", "cleanup"]).unwrap();
        assert!(matches!(args.command, Command::Cleanup { hours: None }));
    }

    #[test]
    fn test_unknown_provider_falls_back_to_default() {
        let args = Args::try_parse_from([
            "researchmill",
            "jobs",
            "--llm-provider",
            "not-a-provider",
        ])
        .unwrap();
        let (_, config) = args.into_parts().unwrap();
        assert_eq!(config.llm.provider, LLMProvider::default());
    }

    #[tokio::test]
    async fn test_polling_gives_up_on_a_job_that_never_finishes() {
        let store = JobStore::open_in_memory().unwrap();
        store.create_job("job-1", "topic", 3).unwrap();

        // 作业一直非终态时轮询耗尽后必须返回，而不是一直等下去
        let reached = crate::cli::wait_for_terminal(&store, "job-1", 3, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(!reached);

        store
            .update_job(
                "job-1",
                JobUpdate {
                    status: Some(JobStatus::Complete),
                    progress_percentage: Some(100),
                    ..Default::default()
                },
            )
            .unwrap();
        let reached = crate::cli::wait_for_terminal(&store, "job-1", 3, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(reached);
    }
}
