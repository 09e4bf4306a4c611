//! Exam integrity monitoring: face-mesh heuristics over a live camera feed,
//! a debounced trust score, host lockdown and out-of-band escalation of
//! suspicious frames to vision-language models.

pub mod camera {
    pub mod domain {
        pub mod frame_source;
        pub mod video_track;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod face_landmarks;
        pub mod landmark_detector;
        pub mod object_detector;
    }
    pub mod infrastructure;
}

pub mod monitoring {
    pub mod domain {
        pub mod heuristic_classifier;
        pub mod proctor_stats;
        pub mod violation;
        pub mod violation_aggregator;
    }
}

pub mod lockdown {
    pub mod domain {
        pub mod integrity_event;
        pub mod lockdown_state;
    }
    pub mod infrastructure;
    pub mod camera_watch;
    pub mod lockdown_enforcer;
}

pub mod escalation {
    pub mod domain {
        pub mod proctoring_flag;
        pub mod vision_backend;
        pub mod vlm_result;
    }
    pub mod infrastructure;
    pub mod escalation_client;
    pub mod escalation_handler;
}

pub mod pipeline {
    pub mod detection_loop;
    pub mod proctor_session;
    pub mod session_observer;
}

pub mod shared {
    pub mod bounding_box;
    pub mod clock;
    pub mod config;
    pub mod constants;
    pub mod frame;
    pub mod model_resolver;
    pub mod subscription;
}
