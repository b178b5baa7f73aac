//! Gaze estimation pipeline: face detection, head pose, facial landmarks
//! and gaze, chained over a stream of frames and driving a pointer.

pub mod shared {
    pub mod clock;
    pub mod constants;
    pub mod frame;
    pub mod region;
}

pub mod inference {
    pub mod domain {
        pub mod inference_session;
        pub mod stage;
        pub mod tensor_codec;
    }
    pub mod infrastructure;
}

pub mod detection {
    pub mod domain {
        pub mod face_detection_stage;
        pub mod face_landmarks;
        pub mod landmark_stage;
    }
}

pub mod estimation {
    pub mod domain {
        pub mod gaze_stage;
        pub mod head_pose_stage;
    }
}

pub mod pointer {
    pub mod domain {
        pub mod pointer_controller;
    }
    pub mod infrastructure;
}

pub mod video {
    pub mod domain {
        pub mod video_source;
    }
    pub mod infrastructure;
}

pub mod visualization {
    pub mod domain {
        pub mod frame_annotator;
        pub mod overlay_flags;
        pub mod overlay_text_sink;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod frame_result;
    pub mod gaze_pipeline;
    pub mod pipeline_logger;
    pub mod session_stats;
}
